//! Built-in autopilot patterns (spec §4.8): purely declarative data, one
//! `Vec<FlightStep>` per name. No pattern here touches a socket or a clock
//! directly — the engine in [`super`] is what walks them against
//! monotonic time.

use super::FlightStep;

fn step(roll: f32, pitch: f32, throttle: f32, yaw: f32, duration_ms: u32) -> FlightStep {
    FlightStep {
        roll,
        pitch,
        throttle,
        yaw,
        duration_ms,
    }
}

pub fn circle() -> Vec<FlightStep> {
    vec![
        step(40.0, 0.0, 20.0, 20.0, 500),
        step(28.0, 28.0, 20.0, 20.0, 500),
        step(0.0, 40.0, 20.0, 20.0, 500),
        step(-28.0, 28.0, 20.0, 20.0, 500),
        step(-40.0, 0.0, 20.0, 20.0, 500),
        step(-28.0, -28.0, 20.0, 20.0, 500),
        step(0.0, -40.0, 20.0, 20.0, 500),
        step(28.0, -28.0, 20.0, 20.0, 500),
    ]
}

pub fn square() -> Vec<FlightStep> {
    vec![
        step(0.0, 40.0, 15.0, 0.0, 1000),
        step(40.0, 0.0, 15.0, 0.0, 1000),
        step(0.0, -40.0, 15.0, 0.0, 1000),
        step(-40.0, 0.0, 15.0, 0.0, 1000),
    ]
}

pub fn figure_eight() -> Vec<FlightStep> {
    vec![
        step(35.0, 20.0, 18.0, 15.0, 600),
        step(35.0, -20.0, 18.0, -15.0, 600),
        step(0.0, 0.0, 18.0, 0.0, 300),
        step(-35.0, 20.0, 18.0, -15.0, 600),
        step(-35.0, -20.0, 18.0, 15.0, 600),
        step(0.0, 0.0, 18.0, 0.0, 300),
    ]
}

pub fn zigzag() -> Vec<FlightStep> {
    vec![
        step(40.0, 40.0, 15.0, 0.0, 400),
        step(-40.0, 40.0, 15.0, 0.0, 400),
        step(40.0, 40.0, 15.0, 0.0, 400),
        step(-40.0, 40.0, 15.0, 0.0, 400),
    ]
}

pub fn hover_and_rotate() -> Vec<FlightStep> {
    vec![
        step(0.0, 0.0, 10.0, 60.0, 1500),
        step(0.0, 0.0, 10.0, 60.0, 1500),
        step(0.0, 0.0, 10.0, 60.0, 1500),
        step(0.0, 0.0, 10.0, 60.0, 1500),
    ]
}

pub fn ascend_descend() -> Vec<FlightStep> {
    vec![
        step(0.0, 0.0, 60.0, 0.0, 2000),
        step(0.0, 0.0, 0.0, 0.0, 500),
        step(0.0, 0.0, -60.0, 0.0, 2000),
        step(0.0, 0.0, 0.0, 0.0, 500),
    ]
}

pub fn orbit() -> Vec<FlightStep> {
    vec![
        step(30.0, 0.0, 15.0, 30.0, 400),
        step(21.0, 21.0, 15.0, 30.0, 400),
        step(0.0, 30.0, 15.0, 30.0, 400),
        step(-21.0, 21.0, 15.0, 30.0, 400),
        step(-30.0, 0.0, 15.0, 30.0, 400),
        step(-21.0, -21.0, 15.0, 30.0, 400),
        step(0.0, -30.0, 15.0, 30.0, 400),
        step(21.0, -21.0, 15.0, 30.0, 400),
    ]
}

pub fn helix() -> Vec<FlightStep> {
    vec![
        step(30.0, 0.0, 40.0, 20.0, 400),
        step(0.0, 30.0, 40.0, 20.0, 400),
        step(-30.0, 0.0, 40.0, 20.0, 400),
        step(0.0, -30.0, 40.0, 20.0, 400),
        step(30.0, 0.0, 40.0, 20.0, 400),
        step(0.0, 30.0, 40.0, 20.0, 400),
    ]
}

pub fn pendulum() -> Vec<FlightStep> {
    vec![
        step(0.0, 50.0, 20.0, 0.0, 700),
        step(0.0, -50.0, 20.0, 0.0, 1400),
        step(0.0, 50.0, 20.0, 0.0, 1400),
        step(0.0, 0.0, 20.0, 0.0, 700),
    ]
}

pub fn spiral_out() -> Vec<FlightStep> {
    vec![
        step(15.0, 0.0, 25.0, 25.0, 350),
        step(0.0, 15.0, 25.0, 25.0, 350),
        step(-15.0, 0.0, 25.0, 25.0, 350),
        step(0.0, -15.0, 25.0, 25.0, 350),
        step(30.0, 0.0, 25.0, 25.0, 350),
        step(0.0, 30.0, 25.0, 25.0, 350),
        step(-30.0, 0.0, 25.0, 25.0, 350),
        step(0.0, -30.0, 25.0, 25.0, 350),
        step(45.0, 0.0, 25.0, 25.0, 350),
        step(0.0, 45.0, 25.0, 25.0, 350),
        step(-45.0, 0.0, 25.0, 25.0, 350),
        step(0.0, -45.0, 25.0, 25.0, 350),
    ]
}

/// Names of every built-in pattern, in the order `lookup` checks them.
pub const NAMES: &[&str] = &[
    "circle",
    "square",
    "figure-eight",
    "zigzag",
    "hover-and-rotate",
    "ascend-descend",
    "orbit",
    "helix",
    "pendulum",
    "spiral-out",
];

/// Resolve a pattern by name, `None` if it isn't one of the ten built-ins.
pub fn lookup(name: &str) -> Option<Vec<FlightStep>> {
    match name {
        "circle" => Some(circle()),
        "square" => Some(square()),
        "figure-eight" => Some(figure_eight()),
        "zigzag" => Some(zigzag()),
        "hover-and-rotate" => Some(hover_and_rotate()),
        "ascend-descend" => Some(ascend_descend()),
        "orbit" => Some(orbit()),
        "helix" => Some(helix()),
        "pendulum" => Some(pendulum()),
        "spiral-out" => Some(spiral_out()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_pattern_resolves_and_is_well_formed() {
        for &name in NAMES {
            let steps = lookup(name).unwrap_or_else(|| panic!("{name} should resolve"));
            assert!(!steps.is_empty(), "{name} should have at least one step");
            for s in &steps {
                assert!(s.duration_ms > 0, "{name} step duration must be positive");
                for axis in [s.roll, s.pitch, s.throttle, s.yaw] {
                    assert!((-100.0..=100.0).contains(&axis), "{name} axis out of range");
                }
            }
        }
    }

    #[test]
    fn unknown_pattern_is_none() {
        assert!(lookup("not-a-real-pattern").is_none());
    }
}
