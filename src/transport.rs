//! Transport (C2): the two UDP endpoints (Ctl and Video) plus the counters
//! the watchdog samples. Built on `tokio::net::UdpSocket` so the periodic
//! senders and the two receivers are plain async tasks rather than OS
//! threads, running on a single cooperative scheduler with timers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::LinkError;

/// Receive buffer size on both endpoints.
const RECV_BUF_LEN: usize = 2048;

fn bind_reuseaddr(local_port: u16) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let addr: SocketAddr = ([0, 0, 0, 0], local_port).into();
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

async fn connected_socket(local_port: u16, peer: &str) -> Result<UdpSocket, LinkError> {
    let std_socket = bind_reuseaddr(local_port)?;
    let socket = UdpSocket::from_std(std_socket)?;
    socket.connect(peer).await?;
    Ok(socket)
}

/// Atomic counters the watchdog reads at 1 Hz without taking a lock that
/// could be held across an I/O wait.
#[derive(Debug, Default)]
struct Counters {
    tx_count: AtomicU64,
    rx_count: AtomicU64,
    video_rx_count: AtomicU64,
}

/// The two UDP endpoints and the send/receive primitives built on top of
/// them.
///
/// Each socket sits behind an `AsyncMutex<Arc<UdpSocket>>` rather than a bare
/// field: `rebind()` (spec §4.7 "C2 rebinds both sockets") needs to swap the
/// live socket out from under the senders/receivers that hold a reference to
/// it. The lock itself is only ever held long enough to clone the `Arc` out
/// or swap it in — never across the `.send()`/`.recv()` await, which is what
/// spec §5 forbids ("this forbids any shared mutex held across I/O waits").
pub struct Transport {
    ctl: AsyncMutex<Arc<UdpSocket>>,
    video: AsyncMutex<Arc<UdpSocket>>,
    counters: Counters,
    last_tx_at: Mutex<Instant>,
    last_rx_at: Mutex<Instant>,
}

impl Transport {
    /// Bind both endpoints and connect each to its peer address (spec
    /// §4.2/§6: Ctl 7080, Video 7070, peer `drone_ip`, `SO_REUSEADDR`).
    pub async fn bind(
        ctl_port: u16,
        video_port: u16,
        ctl_peer: &str,
        video_peer: &str,
    ) -> Result<Self, LinkError> {
        let ctl = connected_socket(ctl_port, ctl_peer).await?;
        let video = connected_socket(video_port, video_peer).await?;

        let now = Instant::now();
        Ok(Transport {
            ctl: AsyncMutex::new(Arc::new(ctl)),
            video: AsyncMutex::new(Arc::new(video)),
            counters: Counters::default(),
            last_tx_at: Mutex::new(now),
            last_rx_at: Mutex::new(now),
        })
    }

    /// Rebind both endpoints in place (spec §4.7 reconnect sequence). Senders
    /// and receivers that are mid-call on the old sockets keep running to
    /// completion against them; every *new* call picks up the freshly bound
    /// pair.
    pub async fn rebind(
        &self,
        ctl_port: u16,
        video_port: u16,
        ctl_peer: &str,
        video_peer: &str,
    ) -> Result<(), LinkError> {
        let ctl = connected_socket(ctl_port, ctl_peer).await?;
        let video = connected_socket(video_port, video_peer).await?;
        *self.ctl.lock().await = Arc::new(ctl);
        *self.video.lock().await = Arc::new(video);
        Ok(())
    }

    async fn current_ctl(&self) -> Arc<UdpSocket> {
        self.ctl.lock().await.clone()
    }

    async fn current_video(&self) -> Arc<UdpSocket> {
        self.video.lock().await.clone()
    }

    /// Fire-and-forget control frame send; updates `tx_count`/`last_tx_at`
    /// regardless of whether the OS accepted it (the failure itself is
    /// reported back to the caller for the watchdog's failure streak).
    pub async fn send_control(&self, frame: &[u8]) -> Result<(), LinkError> {
        let ctl = self.current_ctl().await;
        let result = ctl.send(frame).await;
        *self.last_tx_at.lock().unwrap() = Instant::now();
        self.counters.tx_count.fetch_add(1, Ordering::Relaxed);
        result.map(|_| ()).map_err(LinkError::from)
    }

    /// Single `0x00` heartbeat byte; cadence is owned by the caller.
    pub async fn send_heartbeat(&self) -> Result<(), LinkError> {
        let ctl = self.current_ctl().await;
        ctl.send(&[crate::codec::HEARTBEAT_BYTE]).await?;
        Ok(())
    }

    /// Send a command triple with <= 5 ms spacing between packets, serialized
    /// through the Ctl socket so it completes before any subsequent control
    /// frame.
    pub async fn send_triple(&self, packets: &[[u8; crate::codec::COMMAND_PACKET_LEN]]) -> Result<(), LinkError> {
        let ctl = self.current_ctl().await;
        for (i, pkt) in packets.iter().enumerate() {
            ctl.send(pkt).await?;
            if i + 1 < packets.len() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        Ok(())
    }

    /// Send an arbitrary byte-exact packet on the Ctl socket (camera
    /// switch/rotate singles, video start/stop).
    pub async fn send_ctl_packet(&self, packet: &[u8]) -> Result<(), LinkError> {
        let ctl = self.current_ctl().await;
        ctl.send(packet).await?;
        Ok(())
    }

    /// Receive one datagram from the Ctl socket.
    pub async fn recv_ctl(&self) -> Result<Vec<u8>, LinkError> {
        let ctl = self.current_ctl().await;
        let mut buf = [0u8; RECV_BUF_LEN];
        let n = ctl.recv(&mut buf).await?;
        *self.last_rx_at.lock().unwrap() = Instant::now();
        self.counters.rx_count.fetch_add(1, Ordering::Relaxed);
        Ok(buf[..n].to_vec())
    }

    /// Receive one datagram from the Video socket.
    pub async fn recv_video(&self) -> Result<Vec<u8>, LinkError> {
        let video = self.current_video().await;
        let mut buf = [0u8; RECV_BUF_LEN];
        let n = video.recv(&mut buf).await?;
        self.counters.video_rx_count.fetch_add(1, Ordering::Relaxed);
        Ok(buf[..n].to_vec())
    }

    pub fn tx_count(&self) -> u64 {
        self.counters.tx_count.load(Ordering::Relaxed)
    }
    pub fn rx_count(&self) -> u64 {
        self.counters.rx_count.load(Ordering::Relaxed)
    }
    pub fn video_rx_count(&self) -> u64 {
        self.counters.video_rx_count.load(Ordering::Relaxed)
    }
    pub fn since_last_rx(&self) -> Duration {
        self.last_rx_at.lock().unwrap().elapsed()
    }
    pub fn since_last_tx(&self) -> Duration {
        self.last_tx_at.lock().unwrap().elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two transports loop back to each other on localhost, proving the
    /// send/recv plumbing end to end without touching real hardware.
    /// Built by hand rather than through `Transport::bind` since the real
    /// peer address is only known after both sockets are up.
    async fn loopback_pair() -> (Transport, Transport) {
        let a_ctl = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_ctl = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let a_video = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_video = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        a_ctl.connect(b_ctl.local_addr().unwrap()).await.unwrap();
        b_ctl.connect(a_ctl.local_addr().unwrap()).await.unwrap();
        a_video.connect(b_video.local_addr().unwrap()).await.unwrap();
        b_video.connect(a_video.local_addr().unwrap()).await.unwrap();
        let now = Instant::now();
        let t_a = Transport {
            ctl: AsyncMutex::new(Arc::new(a_ctl)),
            video: AsyncMutex::new(Arc::new(a_video)),
            counters: Counters::default(),
            last_tx_at: Mutex::new(now),
            last_rx_at: Mutex::new(now),
        };
        let t_b = Transport {
            ctl: AsyncMutex::new(Arc::new(b_ctl)),
            video: AsyncMutex::new(Arc::new(b_video)),
            counters: Counters::default(),
            last_tx_at: Mutex::new(now),
            last_rx_at: Mutex::new(now),
        };
        (t_a, t_b)
    }

    #[tokio::test]
    async fn control_frame_round_trips_over_loopback() {
        let (a, b) = loopback_pair().await;
        a.send_control(&[0x66, 0x14, 1, 2, 3, 4]).await.unwrap();
        let received = b.recv_ctl().await.unwrap();
        assert_eq!(received, vec![0x66, 0x14, 1, 2, 3, 4]);
        assert_eq!(a.tx_count(), 1);
        assert_eq!(b.rx_count(), 1);
    }

    #[tokio::test]
    async fn triple_send_preserves_order() {
        let (a, b) = loopback_pair().await;
        let triple = crate::codec::camera_switch_triple();
        a.send_triple(&triple).await.unwrap();
        for expected in triple.iter() {
            let got = b.recv_ctl().await.unwrap();
            assert_eq!(&got, expected);
        }
    }

    #[tokio::test]
    async fn video_counter_increments_independently_of_ctl() {
        let (a, b) = loopback_pair().await;
        a.send_ctl_packet(&crate::codec::video_start_packet())
            .await
            .unwrap();
        let _ = b.recv_ctl().await.unwrap();
        assert_eq!(b.video_rx_count(), 0);
    }

    #[tokio::test]
    async fn rebind_switches_to_a_fresh_socket_pair() {
        let (a, _original_peer) = loopback_pair().await;

        // A brand new peer, unrelated to the original loopback pair.
        let new_ctl_peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let new_video_peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let new_ctl_addr = new_ctl_peer.local_addr().unwrap();
        let new_video_addr = new_video_peer.local_addr().unwrap();

        a.rebind(0, 0, &new_ctl_addr.to_string(), &new_video_addr.to_string())
            .await
            .unwrap();

        a.send_control(&[0x66, 0x14, 1, 2, 3, 4]).await.unwrap();
        let mut buf = [0u8; 64];
        let n = new_ctl_peer.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x66, 0x14, 1, 2, 3, 4]);
    }
}
