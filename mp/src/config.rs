//! Participant configuration
//!
//! The bootstrap file holds the participant id, the message-log path and the
//! coordinator address:
//!
//! ```text
//! 7
//! /tmp/participant-7.log
//! 127.0.0.1 5000
//! ```
//!
//! Host and port may also be given on separate lines.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mcast::ParticipantId;
use mcast::config::{ConfigError, parse_line, read_config_lines};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantConfig {
    pub id: ParticipantId,
    pub log_path: PathBuf,
    pub coordinator_host: String,
    pub coordinator_port: u16,
}

impl ParticipantConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(?path, "ParticipantConfig::load: called");
        let lines = read_config_lines(path)?;

        let id = parse_line(&lines, 1)?;
        let log_path: String = parse_line(&lines, 2)?;
        if log_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                line: 2,
                value: log_path,
            });
        }

        let address = lines.get(2).ok_or(ConfigError::MissingLine(3))?;
        let mut parts = address.split_whitespace();
        let host = parts
            .next()
            .ok_or_else(|| ConfigError::InvalidValue {
                line: 3,
                value: address.clone(),
            })?
            .to_string();
        let port = match parts.next() {
            Some(port) => port.parse().map_err(|_| ConfigError::InvalidValue {
                line: 3,
                value: address.clone(),
            })?,
            None => parse_line(&lines, 4)?,
        };

        Ok(Self {
            id,
            log_path: PathBuf::from(log_path),
            coordinator_host: host,
            coordinator_port: port,
        })
    }
}

/// Participant section of the settings file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSettings {
    /// How long to wait for the coordinator's reply to a command
    #[serde(rename = "response-timeout-ms", default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_response_timeout_ms() -> u64 {
    debug!("default_response_timeout_ms: called");
    // Above the coordinator's connect and delivery timeouts summed over a full pool
    30_000
}

impl Default for ParticipantSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl ParticipantSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Settings file as read by the participant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    #[serde(rename = "log-file")]
    pub log_file: Option<PathBuf>,

    pub participant: ParticipantSettings,
}
