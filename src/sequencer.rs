//! Command Sequencer (C5): edge-armed command-flag bits and the byte-exact
//! packets for the non-flag commands (camera rotate/switch, video
//! start/stop). Sending those packets on the wire is the coordinator's job;
//! this module only knows how to build them and how to track which flag
//! bits are currently armed.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::codec::{self, COMMAND_PACKET_LEN};

/// Armed flags stay in outgoing control frames for this long, then
/// auto-clear (spec §3 `CommandFlags`).
pub const ARM_WINDOW: Duration = Duration::from_millis(1000);

const BIT_TAKEOFF_OR_LAND: usize = 0;
const BIT_EMERGENCY_STOP: usize = 1;
const BIT_CALIBRATE: usize = 2;
const BIT_FLIP_360: usize = 3;
const BIT_LIGHT_TOGGLE: usize = 4;
const FLAG_COUNT: usize = 5;

/// The edge-armed command-flag bitfield carried in control-frame byte 6.
/// Each bit independently arms for [`ARM_WINDOW`] and clears itself;
/// rearming an already-armed bit restarts its window.
#[derive(Debug, Default)]
pub struct CommandFlags {
    armed_at: Mutex<[Option<Instant>; FLAG_COUNT]>,
    /// Most recent `CC 5A`-prefixed remote-command echo routed here from the
    /// Ctl receiver (spec §4.4: "routed to C5 (remote-command listener)").
    last_echo: Mutex<Option<[u8; COMMAND_PACKET_LEN]>>,
}

impl CommandFlags {
    pub fn new() -> Self {
        CommandFlags::default()
    }

    fn arm(&self, bit: usize) {
        self.armed_at.lock().unwrap()[bit] = Some(Instant::now());
    }

    pub fn arm_takeoff_or_land(&self) {
        self.arm(BIT_TAKEOFF_OR_LAND);
    }
    pub fn arm_emergency_stop(&self) {
        self.arm(BIT_EMERGENCY_STOP);
    }
    pub fn arm_calibrate(&self) {
        self.arm(BIT_CALIBRATE);
    }
    pub fn arm_flip(&self) {
        self.arm(BIT_FLIP_360);
    }
    pub fn arm_light_toggle(&self) {
        self.arm(BIT_LIGHT_TOGGLE);
    }

    /// The current byte-6 value: bits for flags armed within the last
    /// [`ARM_WINDOW`], 0 if none are armed. Lazily clears expired bits so a
    /// flag that nobody rearms stops costing a lock scan after it lapses.
    pub fn byte(&self) -> u8 {
        let mut armed_at = self.armed_at.lock().unwrap();
        let mut byte = 0u8;
        for (bit, slot) in armed_at.iter_mut().enumerate() {
            let still_armed = matches!(*slot, Some(at) if at.elapsed() < ARM_WINDOW);
            if still_armed {
                byte |= 1 << bit;
            } else {
                *slot = None;
            }
        }
        byte
    }

    /// Record a command echo observed on the Ctl socket. The sequencer does
    /// not currently drive any behavior off the echo's contents, but it is
    /// the listener the scanner's output is addressed to.
    pub fn observe_echo(&self, echo: [u8; COMMAND_PACKET_LEN]) {
        *self.last_echo.lock().unwrap() = Some(echo);
    }

    /// The last command echo observed, if any.
    pub fn last_echo(&self) -> Option<[u8; COMMAND_PACKET_LEN]> {
        *self.last_echo.lock().unwrap()
    }
}

/// Build the three-packet camera-rotate command for "on" or "off".
pub fn send_camera_rotate(on: bool) -> [[u8; COMMAND_PACKET_LEN]; 3] {
    codec::camera_rotate_triple(on)
}

/// Build the three-packet camera-switch command.
pub fn send_camera_switch() -> [[u8; COMMAND_PACKET_LEN]; 3] {
    codec::camera_switch_triple()
}

/// Build the single-packet video-start command.
pub fn send_video_start() -> [u8; COMMAND_PACKET_LEN] {
    codec::video_start_packet()
}

/// Build the single-packet video-stop command.
pub fn send_video_stop() -> [u8; COMMAND_PACKET_LEN] {
    codec::video_stop_packet()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_flags_are_zero() {
        let flags = CommandFlags::new();
        assert_eq!(flags.byte(), 0);
    }

    #[test]
    fn arming_sets_only_that_bit() {
        let flags = CommandFlags::new();
        flags.arm_takeoff_or_land();
        assert_eq!(flags.byte(), 0b0000_0001);
        flags.arm_flip();
        assert_eq!(flags.byte(), 0b0000_1001);
    }

    #[test]
    fn flag_clears_after_window() {
        let flags = CommandFlags::new();
        flags.arm_takeoff_or_land();
        assert_eq!(flags.byte() & 0x01, 0x01);
        std::thread::sleep(ARM_WINDOW + Duration::from_millis(50));
        assert_eq!(flags.byte() & 0x01, 0x00);
    }

    #[test]
    fn rearming_restarts_the_window() {
        let flags = CommandFlags::new();
        flags.arm_emergency_stop();
        std::thread::sleep(Duration::from_millis(700));
        flags.arm_emergency_stop();
        std::thread::sleep(Duration::from_millis(700));
        // 700ms after the second arm, well past the first arm's window.
        assert_eq!(flags.byte() & 0x02, 0x02);
    }

    #[test]
    fn observed_echo_is_retrievable() {
        let flags = CommandFlags::new();
        assert_eq!(flags.last_echo(), None);
        let echo = [0xCC, 0x5A, 0x01, 0x04, 0x02, 0x00, 0x07];
        flags.observe_echo(echo);
        assert_eq!(flags.last_echo(), Some(echo));
    }
}
