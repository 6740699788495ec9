//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::protocol::DEFAULT_MAX_LINE_BYTES;

/// Coordinator configuration
///
/// `port` and `threshold_secs` normally come from the bootstrap file; the rest
/// from the optional settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// TCP port for control connections
    #[serde(default)]
    pub port: u16,

    /// Maximum age in seconds of a buffered message eligible for replay
    #[serde(rename = "threshold-secs", default = "default_threshold_secs")]
    pub threshold_secs: u64,

    /// Worker pool capacity (concurrent control sessions)
    #[serde(rename = "max-sessions", default = "default_max_sessions")]
    pub max_sessions: usize,

    /// How long shutdown waits for in-flight sessions before aborting them
    #[serde(rename = "shutdown-grace-secs", default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Timeout for opening a delivery channel
    #[serde(rename = "connect-timeout-ms", default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Timeout for a single push on a delivery channel
    #[serde(rename = "delivery-timeout-ms", default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// Longest accepted control line
    #[serde(rename = "max-line-bytes", default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_threshold_secs() -> u64 {
    debug!("default_threshold_secs: called");
    60
}

fn default_max_sessions() -> usize {
    debug!("default_max_sessions: called");
    5
}

fn default_shutdown_grace_secs() -> u64 {
    debug!("default_shutdown_grace_secs: called");
    120
}

fn default_connect_timeout_ms() -> u64 {
    debug!("default_connect_timeout_ms: called");
    5_000
}

fn default_delivery_timeout_ms() -> u64 {
    debug!("default_delivery_timeout_ms: called");
    5_000
}

fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            port: 0,
            threshold_secs: default_threshold_secs(),
            max_sessions: default_max_sessions(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl CoordinatorConfig {
    /// Replay threshold as a Duration
    pub fn threshold(&self) -> Duration {
        Duration::from_secs(self.threshold_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.port, 0);
        assert_eq!(config.max_sessions, 5);
        assert_eq!(config.shutdown_grace_secs, 120);
        assert_eq!(config.connect_timeout_ms, 5_000);
        assert_eq!(config.delivery_timeout_ms, 5_000);
        assert_eq!(config.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
    }

    #[test]
    fn test_durations() {
        let config = CoordinatorConfig {
            threshold_secs: 30,
            delivery_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.threshold(), Duration::from_secs(30));
        assert_eq!(config.delivery_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("max-sessions: 2\nthreshold-secs: 15\n").unwrap();
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.threshold_secs, 15);
        assert_eq!(config.shutdown_grace_secs, 120);
    }
}
