//! Flight State Store (C6): the single authoritative copy of the stick axes,
//! trim, and flight modes. Single-writer through the setters below;
//! read-only to the encode path through [`FlightStateStore::snapshot`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::codec::ControlAxes;

/// An autopilot override is treated as stale past this age and ignored by
/// `snapshot()`.
const OVERRIDE_FRESHNESS: Duration = Duration::from_millis(100);

fn clamp_axis(v: f32) -> f32 {
    v.clamp(-100.0, 100.0)
}

/// The eight stick axes, four trim offsets, and mode flags owned by C6.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FlightState {
    roll: f32,
    pitch: f32,
    throttle: f32,
    yaw: f32,
    follow_dir_x: f32,
    follow_dir_y: f32,
    follow_accel_x: f32,
    follow_accel_y: f32,

    trim_roll: f32,
    trim_pitch: f32,
    trim_throttle: f32,
    trim_yaw: f32,

    speed_level: u8,
    headless: bool,
    lights: bool,
    indoor_mode: bool,
    hover_throttle_cap: u8,
}

impl Default for FlightState {
    fn default() -> Self {
        FlightState {
            roll: 0.0,
            pitch: 0.0,
            throttle: 0.0,
            yaw: 0.0,
            follow_dir_x: 0.0,
            follow_dir_y: 0.0,
            follow_accel_x: 0.0,
            follow_accel_y: 0.0,
            trim_roll: 0.0,
            trim_pitch: 0.0,
            trim_throttle: 0.0,
            trim_yaw: 0.0,
            speed_level: 0,
            headless: false,
            lights: false,
            indoor_mode: false,
            hover_throttle_cap: 30,
        }
    }
}

/// A single-slot, short-locked publish from the autopilot engine (C8) to the
/// flight-state snapshot path. One writer (the autopilot tick loop), one
/// reader (`snapshot`). Staleness beyond [`OVERRIDE_FRESHNESS`] reads back
/// as "no override" without the writer having to explicitly clear it on
/// every tick.
#[derive(Debug, Default)]
pub struct OverrideCell {
    slot: Mutex<Option<OverrideValue>>,
}

#[derive(Debug, Clone, Copy)]
struct OverrideValue {
    roll: f32,
    pitch: f32,
    throttle: f32,
    yaw: f32,
    at: Instant,
}

impl OverrideCell {
    pub fn new() -> Self {
        OverrideCell::default()
    }

    /// Publish the current autopilot step's axes. Called once per 25 ms
    /// tick from the autopilot task.
    pub fn publish(&self, roll: f32, pitch: f32, throttle: f32, yaw: f32) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(OverrideValue {
            roll,
            pitch,
            throttle,
            yaw,
            at: Instant::now(),
        });
    }

    /// Clear the override immediately (spec: `stop()` takes effect within
    /// one 40 Hz tick).
    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap();
        *slot = None;
    }

    fn read_fresh(&self) -> Option<(f32, f32, f32, f32)> {
        let slot = self.slot.lock().unwrap();
        slot.as_ref().and_then(|v| {
            if v.at.elapsed() <= OVERRIDE_FRESHNESS {
                Some((v.roll, v.pitch, v.throttle, v.yaw))
            } else {
                None
            }
        })
    }
}

/// Snapshot returned by [`FlightStateStore::snapshot`]. Encoders operate
/// only on this by-value copy, never on the live state, to keep the mutex's
/// critical section short.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightSnapshot {
    pub axes: ControlAxes,
    pub headless: bool,
    pub lights: bool,
    pub indoor_mode: bool,
    /// Advisory only; the wire encoding of speed level is unconfirmed, so it
    /// never reaches [`crate::codec::encode_control_frame`].
    pub speed_level: u8,
}

/// Mutex-protected [`FlightState`] plus the override channel it projects
/// through on every snapshot.
#[derive(Debug)]
pub struct FlightStateStore {
    state: Mutex<FlightState>,
    override_cell: OverrideCell,
}

impl Default for FlightStateStore {
    fn default() -> Self {
        FlightStateStore {
            state: Mutex::new(FlightState::default()),
            override_cell: OverrideCell::new(),
        }
    }
}

impl FlightStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposed so the autopilot engine can be handed the same cell this
    /// store reads from.
    pub fn override_cell(&self) -> &OverrideCell {
        &self.override_cell
    }

    pub fn set_roll(&self, v: f32) {
        self.state.lock().unwrap().roll = clamp_axis(v);
    }
    pub fn set_pitch(&self, v: f32) {
        self.state.lock().unwrap().pitch = clamp_axis(v);
    }
    pub fn set_throttle(&self, v: f32) {
        self.state.lock().unwrap().throttle = clamp_axis(v);
    }
    pub fn set_yaw(&self, v: f32) {
        self.state.lock().unwrap().yaw = clamp_axis(v);
    }
    pub fn set_follow_dir_x(&self, v: f32) {
        self.state.lock().unwrap().follow_dir_x = clamp_axis(v);
    }
    pub fn set_follow_dir_y(&self, v: f32) {
        self.state.lock().unwrap().follow_dir_y = clamp_axis(v);
    }
    pub fn set_follow_accel_x(&self, v: f32) {
        self.state.lock().unwrap().follow_accel_x = clamp_axis(v);
    }
    pub fn set_follow_accel_y(&self, v: f32) {
        self.state.lock().unwrap().follow_accel_y = clamp_axis(v);
    }

    pub fn set_trim_roll(&self, v: f32) {
        self.state.lock().unwrap().trim_roll = clamp_axis(v);
    }
    pub fn set_trim_pitch(&self, v: f32) {
        self.state.lock().unwrap().trim_pitch = clamp_axis(v);
    }
    pub fn set_trim_throttle(&self, v: f32) {
        self.state.lock().unwrap().trim_throttle = clamp_axis(v);
    }
    pub fn set_trim_yaw(&self, v: f32) {
        self.state.lock().unwrap().trim_yaw = clamp_axis(v);
    }

    pub fn set_speed_level(&self, level: u8) {
        self.state.lock().unwrap().speed_level = level.min(2);
    }
    pub fn set_headless(&self, on: bool) {
        self.state.lock().unwrap().headless = on;
    }
    pub fn set_lights(&self, on: bool) {
        self.state.lock().unwrap().lights = on;
    }
    pub fn set_indoor_mode(&self, on: bool, cap_percent: u8) {
        let mut state = self.state.lock().unwrap();
        state.indoor_mode = on;
        state.hover_throttle_cap = cap_percent.min(100);
    }

    /// Produce a by-value projection of the current state: override axes
    /// replace human input when fresh, trim is added and clamped, and
    /// indoor mode caps the final throttle.
    pub fn snapshot(&self) -> FlightSnapshot {
        let state = *self.state.lock().unwrap();

        let (mut roll, mut pitch, mut throttle, mut yaw) = (
            state.roll,
            state.pitch,
            state.throttle,
            state.yaw,
        );
        if let Some((o_roll, o_pitch, o_throttle, o_yaw)) = self.override_cell.read_fresh() {
            roll = o_roll;
            pitch = o_pitch;
            throttle = o_throttle;
            yaw = o_yaw;
        }

        roll = clamp_axis(roll + state.trim_roll);
        pitch = clamp_axis(pitch + state.trim_pitch);
        throttle = clamp_axis(throttle + state.trim_throttle);
        yaw = clamp_axis(yaw + state.trim_yaw);

        let mut speed_level = state.speed_level;
        if state.indoor_mode {
            throttle = throttle.min(state.hover_throttle_cap as f32);
            speed_level = 0;
        }

        FlightSnapshot {
            axes: ControlAxes {
                roll,
                pitch,
                throttle,
                yaw,
                follow_dir_x: state.follow_dir_x,
                follow_dir_y: state.follow_dir_y,
                follow_accel_x: state.follow_accel_x,
                follow_accel_y: state.follow_accel_y,
            },
            headless: state.headless,
            lights: state.lights,
            indoor_mode: state.indoor_mode,
            speed_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_axis;

    #[test]
    fn center_stays_neutral() {
        let store = FlightStateStore::new();
        let snap = store.snapshot();
        assert_eq!(snap.axes.roll, 0.0);
        assert_eq!(snap.axes.throttle, 0.0);
    }

    #[test]
    fn indoor_mode_caps_throttle_after_trim() {
        let store = FlightStateStore::new();
        store.set_indoor_mode(true, 30);
        store.set_throttle(100.0);
        let snap = store.snapshot();
        assert_eq!(snap.axes.throttle, 30.0);
        assert_eq!(encode_axis(snap.axes.throttle), 0xA6);
        assert_eq!(snap.speed_level, 0);
    }

    #[test]
    fn indoor_mode_forces_speed_zero_even_if_set() {
        let store = FlightStateStore::new();
        store.set_speed_level(2);
        store.set_indoor_mode(true, 30);
        assert_eq!(store.snapshot().speed_level, 0);
    }

    #[test]
    fn trim_is_added_and_clamped() {
        let store = FlightStateStore::new();
        store.set_roll(90.0);
        store.set_trim_roll(50.0);
        assert_eq!(store.snapshot().axes.roll, 100.0);
    }

    #[test]
    fn fresh_override_replaces_primary_axes_only() {
        let store = FlightStateStore::new();
        store.set_lights(true);
        store.set_follow_dir_x(12.0);
        store.override_cell().publish(10.0, 20.0, 30.0, 40.0);
        let snap = store.snapshot();
        assert_eq!(snap.axes.roll, 10.0);
        assert_eq!(snap.axes.pitch, 20.0);
        assert_eq!(snap.axes.throttle, 30.0);
        assert_eq!(snap.axes.yaw, 40.0);
        assert_eq!(snap.axes.follow_dir_x, 12.0);
        assert!(snap.lights);
    }

    #[test]
    fn stale_override_is_ignored() {
        let store = FlightStateStore::new();
        store.override_cell().publish(10.0, 20.0, 30.0, 40.0);
        std::thread::sleep(OVERRIDE_FRESHNESS + Duration::from_millis(50));
        let snap = store.snapshot();
        assert_eq!(snap.axes.roll, 0.0);
    }

    #[test]
    fn cleared_override_falls_back_to_human_input() {
        let store = FlightStateStore::new();
        store.set_roll(5.0);
        store.override_cell().publish(99.0, 0.0, 0.0, 0.0);
        store.override_cell().clear();
        assert_eq!(store.snapshot().axes.roll, 5.0);
    }
}
