use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// Persisted configuration for the link core (spec §6 "Persisted state").
///
/// The core never reads this from disk itself — a collaborator owns loading
/// it (from a TOML/JSON file, CLI flags, whatever fits the host app) and
/// hands the deserialized record to [`crate::coordinator::Coordinator::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub drone_ip: String,
    pub ctl_port: u16,
    pub video_port: u16,
    pub control_interval_ms: u32,
    pub heartbeat_interval_ms: u32,
    pub rx_timeout_s: u32,
    pub hover_throttle_cap: u8,
    pub indoor_default: bool,
    pub low_battery_warn: u8,
    pub low_battery_land: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            drone_ip: "192.168.28.1".to_string(),
            ctl_port: 7080,
            video_port: 7070,
            control_interval_ms: 140,
            heartbeat_interval_ms: 1000,
            rx_timeout_s: 3,
            hover_throttle_cap: 30,
            indoor_default: true,
            low_battery_warn: 20,
            low_battery_land: 10,
        }
    }
}

impl LinkConfig {
    /// Reject configurations that can't produce a working link. Fatal to
    /// `connect()`, never fatal to the process (spec §7 `ConfigError`).
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.drone_ip.trim().is_empty() {
            return Err(LinkError::ConfigError("drone_ip must not be empty".into()));
        }
        if self.control_interval_ms == 0 {
            return Err(LinkError::ConfigError(
                "control_interval_ms must be nonzero".into(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(LinkError::ConfigError(
                "heartbeat_interval_ms must be nonzero".into(),
            ));
        }
        if self.hover_throttle_cap > 100 {
            return Err(LinkError::ConfigError(
                "hover_throttle_cap must be <= 100".into(),
            ));
        }
        if self.low_battery_land > self.low_battery_warn {
            return Err(LinkError::ConfigError(
                "low_battery_land must be <= low_battery_warn".into(),
            ));
        }
        Ok(())
    }

    pub fn ctl_peer(&self) -> String {
        format!("{}:{}", self.drone_ip, self.ctl_port)
    }

    pub fn video_peer(&self) -> String {
        format!("{}:{}", self.drone_ip, self.video_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.ctl_port, 7080);
        assert_eq!(cfg.video_port, 7070);
        assert_eq!(cfg.control_interval_ms, 140);
        assert_eq!(cfg.heartbeat_interval_ms, 1000);
        assert_eq!(cfg.rx_timeout_s, 3);
        assert_eq!(cfg.hover_throttle_cap, 30);
        assert!(cfg.indoor_default);
        assert_eq!(cfg.low_battery_warn, 20);
        assert_eq!(cfg.low_battery_land, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_empty_ip() {
        let mut cfg = LinkConfig::default();
        cfg.drone_ip = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let mut cfg = LinkConfig::default();
        cfg.control_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_battery_thresholds() {
        let mut cfg = LinkConfig::default();
        cfg.low_battery_land = 25;
        cfg.low_battery_warn = 20;
        assert!(cfg.validate().is_err());
    }
}
