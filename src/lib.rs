//! # xr872-link
//!
//! A ground-station core for a consumer quadcopter that speaks the
//! XR872-family Wi-Fi protocol: a 20-byte control frame sent at 140 ms,
//! edge-armed command packets for takeoff/land/flip/etc, MJPEG video
//! reassembly from lossy UDP fragments, and telemetry decoded by scanning
//! the control socket's byte stream for fixed-shape records.
//!
//! This crate owns the protocol and concurrency; it does not render video,
//! draw a HUD, or read a joystick — a host application wires those in by
//! subscribing to [`coordinator::Coordinator::subscribe_telemetry`],
//! [`coordinator::Coordinator::subscribe_video`], and
//! [`coordinator::Coordinator::watch_status`], and by calling the command
//! methods on [`coordinator::Coordinator`] from whatever input source it has.
//!
//! ### Example
//!
//! ```no_run
//! use xr872_link::{Coordinator, LinkConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> xr872_link::error::Result<()> {
//! let coordinator = Arc::new(Coordinator::new(LinkConfig::default()).await?);
//! coordinator.connect().await?;
//! coordinator.set_stick(xr872_link::coordinator::Axis::Throttle, 40.0);
//! coordinator.arm_takeoff();
//! coordinator.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod autopilot;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod flight_state;
pub mod sequencer;
pub mod telemetry;
pub mod transport;
pub mod video;
pub mod watchdog;

pub use config::LinkConfig;
pub use coordinator::Coordinator;
pub use error::{LinkError, Result};
pub use watchdog::LinkState;
