//! Protocol Coordinator (C9): owns every other component, wires the tokio
//! tasks together, and is the only type collaborators construct directly.
//! One struct owns both sockets and exposes command methods; the tasks
//! themselves are `tokio::spawn`ed rather than driven from a single `poll()`
//! call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::autopilot::{AutopilotEngine, AutopilotStatus};
use crate::codec;
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::flight_state::FlightStateStore;
use crate::sequencer::CommandFlags;
use crate::telemetry::{ScanResult, TelemetryParser, TelemetryRecord, TriggerEdgeDetector};
use crate::transport::Transport;
use crate::video::VideoReassembler;
use crate::watchdog::{LinkState, Watchdog};

/// Capacity of the telemetry/video broadcast channels. A slow collaborator
/// that falls this far behind starts seeing `RecvError::Lagged`, which is an
/// acceptable trade against unbounded memory growth on a link that is lossy
/// by design.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One stick/trim axis, named the way `set_stick`/`set_trim` address them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Roll,
    Pitch,
    Throttle,
    Yaw,
}

/// Status broadcast over the `on_status` stream: either a link-state
/// transition or an informational note from the sequencer or watchdog.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    Link(LinkState),
    Message(String),
}

struct Tasks {
    handles: Vec<JoinHandle<()>>,
}

/// At most one queued operation per category while the link isn't Connected
/// (spec §4.7: "others queue at most one pending operation per category,
/// replacing older queued ops"). Flushed once the link reaches `Connected`.
#[derive(Debug, Default)]
struct PendingOps {
    arm_takeoff_or_land: bool,
    arm_estop: bool,
    arm_calibrate: bool,
    arm_flip: bool,
    arm_light_toggle: bool,
    camera_switch: bool,
    camera_rotate: Option<bool>,
    video_start: bool,
    video_stop: bool,
}

/// Owns C1-C8, every background task, and the public API surface.
pub struct Coordinator {
    config: LinkConfig,
    transport: Arc<Transport>,
    flight_state: Arc<FlightStateStore>,
    command_flags: Arc<CommandFlags>,
    autopilot: Arc<AutopilotEngine>,
    watchdog: Arc<std::sync::Mutex<Watchdog>>,
    telemetry_parser: Arc<std::sync::Mutex<TelemetryParser>>,
    video_reassembler: Arc<std::sync::Mutex<VideoReassembler>>,
    pending: std::sync::Mutex<PendingOps>,

    telemetry_tx: broadcast::Sender<TelemetryRecord>,
    video_tx: broadcast::Sender<Vec<u8>>,
    status_tx: watch::Sender<StatusEvent>,
    status_rx: watch::Receiver<StatusEvent>,

    tasks: AsyncMutex<Option<Tasks>>,
}

impl Coordinator {
    /// Validate `config`, bind both sockets, and return a coordinator with
    /// no background tasks running yet. Call [`Coordinator::connect`] to
    /// start them.
    pub async fn new(config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let transport = Transport::bind(
            config.ctl_port,
            config.video_port,
            &config.ctl_peer(),
            &config.video_peer(),
        )
        .await?;

        let (telemetry_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (video_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(StatusEvent::Link(LinkState::Disconnected));

        let flight_state = Arc::new(FlightStateStore::new());
        flight_state.set_indoor_mode(config.indoor_default, config.hover_throttle_cap);

        Ok(Coordinator {
            config,
            transport: Arc::new(transport),
            flight_state,
            command_flags: Arc::new(CommandFlags::new()),
            autopilot: Arc::new(AutopilotEngine::new()),
            watchdog: Arc::new(std::sync::Mutex::new(Watchdog::new())),
            telemetry_parser: Arc::new(std::sync::Mutex::new(TelemetryParser::new())),
            video_reassembler: Arc::new(std::sync::Mutex::new(VideoReassembler::new())),
            pending: std::sync::Mutex::new(PendingOps::default()),
            telemetry_tx,
            video_tx,
            status_tx,
            status_rx,
            tasks: AsyncMutex::new(None),
        })
    }

    /// Subscribe to decoded telemetry records.
    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryRecord> {
        self.telemetry_tx.subscribe()
    }

    /// Subscribe to complete JPEG video frames.
    pub fn subscribe_video(&self) -> broadcast::Receiver<Vec<u8>> {
        self.video_tx.subscribe()
    }

    /// Watch link-state and informational status events.
    pub fn watch_status(&self) -> watch::Receiver<StatusEvent> {
        self.status_rx.clone()
    }

    fn publish_status(&self, event: StatusEvent) {
        let _ = self.status_tx.send(event);
    }

    /// Start every background task in startup order. Idempotent only in the
    /// sense that calling it twice spawns a second set of tasks — callers
    /// are expected to call it exactly once per `new()`.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        self.publish_status(StatusEvent::Link(LinkState::Connecting));
        {
            let mut wd = self.watchdog.lock().unwrap();
            wd.reconnect_started();
        }

        let mut handles = Vec::new();
        handles.push(self.spawn_ctl_receiver());
        handles.push(self.spawn_video_receiver());
        handles.push(self.spawn_heartbeat_sender());
        handles.push(self.spawn_control_sender());
        handles.push(self.spawn_watchdog_sampler());
        handles.push(self.spawn_autopilot_tick());

        *self.tasks.lock().await = Some(Tasks { handles });

        self.transport.send_ctl_packet(&codec::video_start_packet()).await?;
        info!("xr872 link connect sequence complete");
        Ok(())
    }

    /// Control sender: re-encodes and sends the current flight-state
    /// snapshot every `control_interval_ms`.
    fn spawn_control_sender(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(
                this.config.control_interval_ms as u64,
            ));
            loop {
                interval.tick().await;
                let snapshot = this.flight_state.snapshot();
                let flags_byte = this.command_flags.byte();
                // No collaborator-facing setter exists for follow-mode
                // enable; the four follow axes are tracked, but the flag
                // byte itself is always off.
                let frame = codec::encode_control_frame(
                    &snapshot.axes,
                    flags_byte,
                    snapshot.headless,
                    false,
                    None,
                );
                let ok = this.transport.send_control(&frame).await.is_ok();
                let transition = this.watchdog.lock().unwrap().on_send_result(ok);
                if let Some(state) = transition {
                    this.on_link_transition(state);
                }
            }
        })
    }

    /// Heartbeat sender: one `0x00` byte every `heartbeat_interval_ms`.
    fn spawn_heartbeat_sender(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(
                this.config.heartbeat_interval_ms as u64,
            ));
            loop {
                interval.tick().await;
                if let Err(err) = this.transport.send_heartbeat().await {
                    debug!(?err, "heartbeat send failed");
                }
            }
        })
    }

    /// Ctl receiver: scans every inbound byte for telemetry records and
    /// command echoes, feeds trigger-edge detection, and confirms the link
    /// on first receipt after a reconnect.
    fn spawn_ctl_receiver(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut edges = TriggerEdgeDetector::new();
            loop {
                match this.transport.recv_ctl().await {
                    Ok(bytes) => {
                        let transition = this.watchdog.lock().unwrap().link_confirmed();
                        if let Some(state) = transition {
                            this.on_link_transition(state);
                        }
                        let results = this.telemetry_parser.lock().unwrap().ingest(&bytes);
                        for result in results {
                            match result {
                                ScanResult::Telemetry(record) => {
                                    for event in edges.observe(&record) {
                                        this.publish_status(StatusEvent::Message(format!(
                                            "{event:?}"
                                        )));
                                    }
                                    let _ = this.telemetry_tx.send(record);
                                }
                                ScanResult::CommandEcho(echo) => {
                                    this.command_flags.observe_echo(echo);
                                    debug!(?echo, "command echo routed to sequencer");
                                }
                            }
                        }
                    }
                    Err(err) => {
                        debug!(?err, "ctl receive failed");
                    }
                }
            }
        })
    }

    /// Video receiver: reassembles fragments into whole JPEG frames.
    fn spawn_video_receiver(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match this.transport.recv_video().await {
                    Ok(packet) => {
                        let frame = this.video_reassembler.lock().unwrap().ingest(&packet);
                        if let Some(frame) = frame {
                            let _ = this.video_tx.send(frame);
                        }
                    }
                    Err(err) => {
                        debug!(?err, "video receive failed");
                    }
                }
            }
        })
    }

    /// Watchdog sampler: checks RX freshness once a second.
    fn spawn_watchdog_sampler(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let timeout = Duration::from_secs(this.config.rx_timeout_s as u64);
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let since_rx = this.transport.since_last_rx();
                let transition = this.watchdog.lock().unwrap().on_rx_sample(since_rx, timeout);
                if let Some(state) = transition {
                    this.on_link_transition(state);
                }
            }
        })
    }

    /// Autopilot tick at 40 Hz, publishing into the override cell the
    /// flight-state snapshot path reads from.
    fn spawn_autopilot_tick(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(25));
            loop {
                interval.tick().await;
                match this.autopilot.tick(Instant::now()) {
                    Some((roll, pitch, throttle, yaw)) => {
                        this.flight_state
                            .override_cell()
                            .publish(roll, pitch, throttle, yaw);
                    }
                    None => this.flight_state.override_cell().clear(),
                }
            }
        })
    }

    /// Dispatch on every state change: Disconnected kicks off a reconnect
    /// attempt, Connected flushes whatever got queued while the link was
    /// down (spec §4.7).
    fn on_link_transition(self: &Arc<Self>, state: LinkState) {
        info!(?state, "link state transition");
        self.publish_status(StatusEvent::Link(state));
        match state {
            LinkState::Disconnected => {
                warn!("link disconnected, starting automatic reconnect");
                self.spawn_reconnect();
            }
            LinkState::Connected => self.spawn_flush_pending(),
            LinkState::Connecting | LinkState::Degraded => {}
        }
    }

    /// Spawn the reconnect routine so the watchdog sampler / control sender
    /// that observed the Disconnected transition isn't itself blocked on the
    /// rebind.
    fn spawn_reconnect(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.reconnect().await;
        })
    }

    /// Reconnect sequence (spec §4.7): rebind both sockets, reset C3/C4,
    /// retain C5's armed flags (user intent persists), and move the
    /// watchdog to Connecting. The first Ctl receive after this drives
    /// `link_confirmed()` -> Connected from [`Coordinator::spawn_ctl_receiver`].
    async fn reconnect(self: &Arc<Self>) {
        match self
            .transport
            .rebind(
                self.config.ctl_port,
                self.config.video_port,
                &self.config.ctl_peer(),
                &self.config.video_peer(),
            )
            .await
        {
            Ok(()) => {
                self.video_reassembler.lock().unwrap().reset();
                self.telemetry_parser.lock().unwrap().reset();
                let transition = self.watchdog.lock().unwrap().reconnect_started();
                if let Some(state) = transition {
                    self.on_link_transition(state);
                }
                info!("reconnect rebind complete, awaiting link confirmation");
            }
            Err(err) => {
                warn!(?err, "reconnect rebind failed");
            }
        }
    }

    /// Replay whatever arming/camera/video operations were queued while the
    /// link wasn't `Connected`.
    fn spawn_flush_pending(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.flush_pending().await;
        })
    }

    async fn flush_pending(&self) {
        let ops = std::mem::take(&mut *self.pending.lock().unwrap());

        if ops.arm_takeoff_or_land {
            self.command_flags.arm_takeoff_or_land();
        }
        if ops.arm_estop {
            self.command_flags.arm_emergency_stop();
        }
        if ops.arm_calibrate {
            self.command_flags.arm_calibrate();
        }
        if ops.arm_flip {
            self.command_flags.arm_flip();
        }
        if ops.arm_light_toggle {
            self.command_flags.arm_light_toggle();
        }
        if ops.camera_switch {
            if let Err(err) = self
                .transport
                .send_triple(&crate::sequencer::send_camera_switch())
                .await
            {
                debug!(?err, "queued camera switch failed to send");
            }
        }
        if let Some(on) = ops.camera_rotate {
            if let Err(err) = self
                .transport
                .send_triple(&crate::sequencer::send_camera_rotate(on))
                .await
            {
                debug!(?err, "queued camera rotate failed to send");
            }
        }
        if ops.video_start {
            if let Err(err) = self
                .transport
                .send_ctl_packet(&crate::sequencer::send_video_start())
                .await
            {
                debug!(?err, "queued video start failed to send");
            }
        }
        if ops.video_stop {
            if let Err(err) = self
                .transport
                .send_ctl_packet(&crate::sequencer::send_video_stop())
                .await
            {
                debug!(?err, "queued video stop failed to send");
            }
        }
    }

    fn permits_arming(&self) -> bool {
        self.watchdog.lock().unwrap().permits_arming()
    }

    // ---- Public command API ----

    pub fn set_stick(&self, axis: Axis, value: f32) {
        match axis {
            Axis::Roll => self.flight_state.set_roll(value),
            Axis::Pitch => self.flight_state.set_pitch(value),
            Axis::Throttle => self.flight_state.set_throttle(value),
            Axis::Yaw => self.flight_state.set_yaw(value),
        }
    }

    pub fn set_trim(&self, axis: Axis, value: f32) {
        match axis {
            Axis::Roll => self.flight_state.set_trim_roll(value),
            Axis::Pitch => self.flight_state.set_trim_pitch(value),
            Axis::Throttle => self.flight_state.set_trim_throttle(value),
            Axis::Yaw => self.flight_state.set_trim_yaw(value),
        }
    }

    pub fn set_speed(&self, level: u8) {
        self.flight_state.set_speed_level(level);
    }

    pub fn set_headless(&self, on: bool) {
        self.flight_state.set_headless(on);
    }

    pub fn set_lights(&self, on: bool) {
        self.flight_state.set_lights(on);
    }

    pub fn set_indoor_mode(&self, on: bool, cap_percent: u8) {
        self.flight_state.set_indoor_mode(on, cap_percent);
    }

    /// Takeoff and land share a single edge-armed bit: whichever of
    /// `arm_takeoff`/`arm_land` is called, the drone's own firmware
    /// interprets the bit based on whether it is currently airborne (see
    /// DESIGN.md).
    ///
    /// Only `Connected` permits arming (spec §4.7); outside that state the
    /// request is queued, replacing any older queued request of the same
    /// kind, and replayed once the link reaches `Connected`.
    pub fn arm_takeoff(&self) {
        if self.permits_arming() {
            self.command_flags.arm_takeoff_or_land();
        } else {
            self.pending.lock().unwrap().arm_takeoff_or_land = true;
        }
    }
    pub fn arm_land(&self) {
        self.arm_takeoff();
    }
    pub fn arm_estop(&self) {
        if self.permits_arming() {
            self.command_flags.arm_emergency_stop();
        } else {
            self.pending.lock().unwrap().arm_estop = true;
        }
    }
    pub fn arm_calibrate(&self) {
        if self.permits_arming() {
            self.command_flags.arm_calibrate();
        } else {
            self.pending.lock().unwrap().arm_calibrate = true;
        }
    }
    pub fn arm_flip(&self) {
        if self.permits_arming() {
            self.command_flags.arm_flip();
        } else {
            self.pending.lock().unwrap().arm_flip = true;
        }
    }
    pub fn arm_light_toggle(&self) {
        if self.permits_arming() {
            self.command_flags.arm_light_toggle();
        } else {
            self.pending.lock().unwrap().arm_light_toggle = true;
        }
    }

    pub async fn send_camera_switch(&self) -> Result<()> {
        if !self.permits_arming() {
            self.pending.lock().unwrap().camera_switch = true;
            return Ok(());
        }
        self.transport.send_triple(&crate::sequencer::send_camera_switch()).await
    }

    pub async fn send_camera_rotate(&self, on: bool) -> Result<()> {
        if !self.permits_arming() {
            self.pending.lock().unwrap().camera_rotate = Some(on);
            return Ok(());
        }
        self.transport
            .send_triple(&crate::sequencer::send_camera_rotate(on))
            .await
    }

    pub async fn send_video_start(&self) -> Result<()> {
        if !self.permits_arming() {
            self.pending.lock().unwrap().video_start = true;
            return Ok(());
        }
        self.transport
            .send_ctl_packet(&crate::sequencer::send_video_start())
            .await
    }

    pub async fn send_video_stop(&self) -> Result<()> {
        if !self.permits_arming() {
            self.pending.lock().unwrap().video_stop = true;
            return Ok(());
        }
        self.transport
            .send_ctl_packet(&crate::sequencer::send_video_stop())
            .await
    }

    pub fn autopilot_start(&self, name: &str) -> Result<()> {
        self.autopilot.start(name)
    }

    pub fn autopilot_stop(&self) {
        self.autopilot.stop();
        self.flight_state.override_cell().clear();
    }

    pub fn autopilot_status(&self) -> AutopilotStatus {
        self.autopilot.status()
    }

    pub fn link_state(&self) -> LinkState {
        self.watchdog.lock().unwrap().state()
    }

    /// Shutdown sequence: send video-stop, then abort every task and wait
    /// up to 2 s for them to unwind before giving up.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.send_video_stop().await;

        let mut guard = self.tasks.lock().await;
        let Some(tasks) = guard.take() else {
            return Ok(());
        };
        for handle in &tasks.handles {
            handle.abort();
        }
        let deadline = Duration::from_secs(2);
        let joined = tokio::time::timeout(deadline, async {
            for handle in tasks.handles {
                let _ = handle.await;
            }
        })
        .await;
        if joined.is_err() {
            warn!("tasks did not join within shutdown deadline, forcing");
            return Err(LinkError::ShutdownTimeout(deadline));
        }
        Ok(())
    }
}
