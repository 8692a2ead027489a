//! Watchdog (C7, spec §4.7): detects RX/TX stalls and drives the
//! [`LinkState`] machine that gates C5 arming and tells collaborators when
//! the link is unusable. The state machine itself is pure and takes
//! `Duration`s rather than sampling a clock, so it can be driven by a real
//! 1 Hz task or by a test without sleeping.

use std::time::Duration;

/// Link connectivity state (spec §3). Transitions are published exactly
/// once per change — see [`Watchdog::transition`] returning `None` when the
/// state doesn't actually move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

/// Two consecutive stale-RX samples after going Degraded force a
/// reconnect (spec §4.7).
const MISSES_BEFORE_DISCONNECT: u8 = 2;
/// Three consecutive OS-level send failures force a reconnect (spec §4.7).
const SEND_FAILURES_BEFORE_DISCONNECT: u8 = 3;

#[derive(Debug)]
pub struct Watchdog {
    state: LinkState,
    rx_misses: u8,
    tx_failures: u8,
}

impl Default for Watchdog {
    fn default() -> Self {
        Watchdog {
            state: LinkState::Disconnected,
            rx_misses: 0,
            tx_failures: 0,
        }
    }
}

impl Watchdog {
    pub fn new() -> Self {
        Watchdog::default()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Only `Connected` permits C5 arming operations (spec §4.7).
    pub fn permits_arming(&self) -> bool {
        self.state == LinkState::Connected
    }

    fn transition(&mut self, new: LinkState) -> Option<LinkState> {
        if self.state == new {
            None
        } else {
            self.state = new;
            Some(new)
        }
    }

    /// Called once per second (spec: "samples C2 counters at 1 Hz") with
    /// how long it has been since the last Ctl-socket receive. Returns the
    /// new state if this sample caused a transition.
    pub fn on_rx_sample(&mut self, since_last_rx: Duration, rx_timeout: Duration) -> Option<LinkState> {
        match self.state {
            LinkState::Connected if since_last_rx > rx_timeout => {
                self.rx_misses = 1;
                self.transition(LinkState::Degraded)
            }
            LinkState::Degraded if since_last_rx > rx_timeout => {
                self.rx_misses += 1;
                if self.rx_misses >= MISSES_BEFORE_DISCONNECT {
                    self.rx_misses = 0;
                    self.transition(LinkState::Disconnected)
                } else {
                    None
                }
            }
            LinkState::Degraded => {
                self.rx_misses = 0;
                self.transition(LinkState::Connected)
            }
            _ => None,
        }
    }

    /// Called after each `send_control` attempt. Three consecutive
    /// failures at the OS level force a reconnect.
    pub fn on_send_result(&mut self, ok: bool) -> Option<LinkState> {
        if ok {
            self.tx_failures = 0;
            None
        } else {
            self.tx_failures += 1;
            if self.tx_failures >= SEND_FAILURES_BEFORE_DISCONNECT {
                self.tx_failures = 0;
                self.transition(LinkState::Disconnected)
            } else {
                None
            }
        }
    }

    /// The coordinator calls this once it has rebound both sockets and
    /// kicked off `reconnect()`.
    pub fn reconnect_started(&mut self) -> Option<LinkState> {
        self.rx_misses = 0;
        self.tx_failures = 0;
        self.transition(LinkState::Connecting)
    }

    /// First telemetry packet or a successful send round-trip after a
    /// reconnect — the only way out of `Connecting`.
    pub fn link_confirmed(&mut self) -> Option<LinkState> {
        if self.state == LinkState::Connecting {
            self.transition(LinkState::Connected)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(3);

    #[test]
    fn starts_disconnected() {
        assert_eq!(Watchdog::new().state(), LinkState::Disconnected);
    }

    #[test]
    fn rx_stall_degrades_then_disconnects() {
        let mut wd = Watchdog::new();
        wd.reconnect_started();
        wd.link_confirmed();
        assert_eq!(wd.state(), LinkState::Connected);

        // peer goes quiet for longer than the timeout
        let stall = Duration::from_secs(4);
        assert_eq!(wd.on_rx_sample(stall, TIMEOUT), Some(LinkState::Degraded));
        assert_eq!(wd.on_rx_sample(stall, TIMEOUT), Some(LinkState::Disconnected));
        assert_eq!(wd.state(), LinkState::Disconnected);
    }

    #[test]
    fn recovering_rx_during_degraded_returns_to_connected() {
        let mut wd = Watchdog::new();
        wd.reconnect_started();
        wd.link_confirmed();
        wd.on_rx_sample(Duration::from_secs(4), TIMEOUT);
        assert_eq!(wd.state(), LinkState::Degraded);
        assert_eq!(
            wd.on_rx_sample(Duration::from_millis(10), TIMEOUT),
            Some(LinkState::Connected)
        );
    }

    #[test]
    fn three_send_failures_force_disconnect() {
        let mut wd = Watchdog::new();
        wd.reconnect_started();
        wd.link_confirmed();
        assert_eq!(wd.on_send_result(false), None);
        assert_eq!(wd.on_send_result(false), None);
        assert_eq!(wd.on_send_result(false), Some(LinkState::Disconnected));
    }

    #[test]
    fn a_success_resets_the_failure_streak() {
        let mut wd = Watchdog::new();
        wd.reconnect_started();
        wd.link_confirmed();
        wd.on_send_result(false);
        wd.on_send_result(false);
        wd.on_send_result(true);
        assert_eq!(wd.on_send_result(false), None);
    }

    #[test]
    fn reconnect_sequence_matches_state_machine() {
        let mut wd = Watchdog::new();
        assert_eq!(wd.state(), LinkState::Disconnected);
        assert_eq!(wd.reconnect_started(), Some(LinkState::Connecting));
        assert_eq!(wd.link_confirmed(), Some(LinkState::Connected));
        assert!(wd.permits_arming());
    }

    #[test]
    fn arming_is_blocked_outside_connected() {
        let wd = Watchdog::new();
        assert!(!wd.permits_arming());
    }

    #[test]
    fn repeated_transition_to_same_state_reports_no_change() {
        let mut wd = Watchdog::new();
        wd.reconnect_started();
        assert_eq!(wd.reconnect_started(), None);
    }
}
