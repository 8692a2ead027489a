//! Autopilot Engine (C8, spec §4.8): walks a declarative [`FlightStep`]
//! sequence against monotonic time and publishes the current step's axes
//! into the flight-state override channel. Runs its own 40 Hz tick outside
//! this module (see [`crate::coordinator`]); everything here is the pure
//! step-advance logic plus the pattern library.

pub mod patterns;

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::LinkError;

/// One leg of an autopilot pattern (spec §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightStep {
    pub roll: f32,
    pub pitch: f32,
    pub throttle: f32,
    pub yaw: f32,
    pub duration_ms: u32,
}

/// Snapshot of what the engine is doing right now.
#[derive(Debug, Clone, PartialEq)]
pub enum AutopilotStatus {
    Idle,
    Running { name: String, progress: f32 },
}

struct RunningPattern {
    name: String,
    steps: Vec<FlightStep>,
    step_index: usize,
    step_started_at: Instant,
}

#[derive(Default)]
struct Inner {
    pattern: Option<RunningPattern>,
}

/// Time-driven pattern executor. `start`/`stop`/`status` are safe to call
/// from any task; `tick` is meant to be driven by a single dedicated 40 Hz
/// loop (spec §4.8).
#[derive(Default)]
pub struct AutopilotEngine {
    inner: Mutex<Inner>,
}

impl AutopilotEngine {
    pub fn new() -> Self {
        AutopilotEngine::default()
    }

    /// Start (or restart) execution of a named built-in pattern.
    pub fn start(&self, name: &str) -> Result<(), LinkError> {
        let steps = patterns::lookup(name)
            .ok_or_else(|| LinkError::ConfigError(format!("unknown autopilot pattern '{name}'")))?;
        let mut inner = self.inner.lock().unwrap();
        inner.pattern = Some(RunningPattern {
            name: name.to_string(),
            steps,
            step_index: 0,
            step_started_at: Instant::now(),
        });
        Ok(())
    }

    /// Stop immediately; the caller is responsible for clearing the
    /// override cell so the next snapshot falls back to human input within
    /// one 40 Hz tick (spec §4.8).
    pub fn stop(&self) {
        self.inner.lock().unwrap().pattern = None;
    }

    pub fn status(&self) -> AutopilotStatus {
        let inner = self.inner.lock().unwrap();
        match &inner.pattern {
            None => AutopilotStatus::Idle,
            Some(p) => {
                let total_ms: u64 = p.steps.iter().map(|s| s.duration_ms as u64).sum();
                let elapsed_ms: u64 = p.steps[..p.step_index]
                    .iter()
                    .map(|s| s.duration_ms as u64)
                    .sum::<u64>()
                    + p.step_started_at.elapsed().as_millis() as u64;
                let progress = if total_ms == 0 {
                    1.0
                } else {
                    (elapsed_ms as f32 / total_ms as f32).min(1.0)
                };
                AutopilotStatus::Running {
                    name: p.name.clone(),
                    progress,
                }
            }
        }
    }

    /// Advance the current step if its duration has elapsed and return the
    /// axes to publish into the override cell. `None` means the engine is
    /// idle, or the pattern just finished — either way the caller should
    /// clear the override.
    pub fn tick(&self, now: Instant) -> Option<(f32, f32, f32, f32)> {
        let mut inner = self.inner.lock().unwrap();
        let finished = {
            let p = inner.pattern.as_mut()?;
            if now.duration_since(p.step_started_at) >= Duration::from_millis(p.steps[p.step_index].duration_ms as u64) {
                p.step_index += 1;
                p.step_started_at = now;
            }
            p.step_index >= p.steps.len()
        };
        if finished {
            inner.pattern = None;
            return None;
        }
        let p = inner.pattern.as_ref().unwrap();
        let step = &p.steps[p.step_index];
        Some((step.roll, step.pitch, step.throttle, step.yaw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_engine_ticks_to_nothing() {
        let engine = AutopilotEngine::new();
        assert_eq!(engine.tick(Instant::now()), None);
        assert_eq!(engine.status(), AutopilotStatus::Idle);
    }

    #[test]
    fn unknown_pattern_is_rejected() {
        let engine = AutopilotEngine::new();
        assert!(engine.start("not-a-pattern").is_err());
    }

    #[test]
    fn running_pattern_reports_progress_and_advances() {
        let engine = AutopilotEngine::new();
        engine.start("square").unwrap();
        match engine.status() {
            AutopilotStatus::Running { name, progress } => {
                assert_eq!(name, "square");
                assert!(progress < 0.1);
            }
            other => panic!("expected running, got {other:?}"),
        }

        let t0 = Instant::now();
        let first = engine.tick(t0).expect("first tick should yield axes");
        assert_eq!(first, (0.0, 40.0, 15.0, 0.0));

        // advance well past the first step's 1000ms duration
        let t1 = t0 + Duration::from_millis(1200);
        let second = engine.tick(t1).expect("second tick should yield next step");
        assert_eq!(second, (40.0, 0.0, 15.0, 0.0));
    }

    #[test]
    fn pattern_completion_clears_status_to_idle() {
        let engine = AutopilotEngine::new();
        engine.start("zigzag").unwrap();
        let mut now = Instant::now();
        // zigzag has 4 steps of 400ms; run well past the whole pattern.
        for _ in 0..6 {
            now += Duration::from_millis(400);
            engine.tick(now);
        }
        assert_eq!(engine.status(), AutopilotStatus::Idle);
        assert_eq!(engine.tick(now), None);
    }

    #[test]
    fn stop_takes_effect_immediately() {
        let engine = AutopilotEngine::new();
        engine.start("circle").unwrap();
        engine.stop();
        assert_eq!(engine.status(), AutopilotStatus::Idle);
        assert_eq!(engine.tick(Instant::now()), None);
    }
}
