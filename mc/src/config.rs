//! Configuration loading
//!
//! Two sources: the positional bootstrap file (listen port and replay
//! threshold, one per line) and an optional YAML settings file for everything
//! else. Values from the bootstrap file win.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::coordinator::CoordinatorConfig;

/// Errors reading a line-oriented bootstrap file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {0} is missing")]
    MissingLine(usize),

    #[error("line {line}: invalid value '{value}'")]
    InvalidValue { line: usize, value: String },
}

/// Read a bootstrap file as trimmed lines, ignoring trailing blank lines
pub fn read_config_lines(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines: Vec<String> = content.lines().map(|l| l.trim().to_string()).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    Ok(lines)
}

/// Parse line `n` (1-based) of `lines`
pub fn parse_line<T: std::str::FromStr>(lines: &[String], n: usize) -> Result<T, ConfigError> {
    let value = lines.get(n - 1).ok_or(ConfigError::MissingLine(n))?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        line: n,
        value: value.clone(),
    })
}

/// Coordinator bootstrap: listen port and replay threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bootstrap {
    pub port: u16,
    pub threshold_secs: u64,
}

impl Bootstrap {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(?path, "Bootstrap::load: called");
        let lines = read_config_lines(path)?;
        Ok(Self {
            port: parse_line(&lines, 1)?,
            threshold_secs: parse_line(&lines, 2)?,
        })
    }
}

/// Settings file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Write logs here instead of stderr
    #[serde(rename = "log-file")]
    pub log_file: Option<PathBuf>,

    pub coordinator: CoordinatorConfig,
}

/// Load a YAML settings file with fallback chain
///
/// `settings_path` if given (must parse), else `./.mcast.yml`, else
/// `<config dir>/mcast/mcast.yml`, else defaults. The participant reads the
/// same files and ignores the coordinator section.
pub fn load_settings<T: DeserializeOwned + Default>(settings_path: Option<&PathBuf>) -> Result<T> {
    if let Some(path) = settings_path {
        return load_from_file(path).context(format!("Failed to load settings from {}", path.display()));
    }

    // Project-local: .mcast.yml
    let local = PathBuf::from(".mcast.yml");
    if local.exists() {
        match load_from_file(&local) {
            Ok(settings) => return Ok(settings),
            Err(e) => tracing::warn!("Failed to load settings from {}: {}", local.display(), e),
        }
    }

    // User: ~/.config/mcast/mcast.yml
    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join("mcast").join("mcast.yml");
        if user.exists() {
            match load_from_file(&user) {
                Ok(settings) => return Ok(settings),
                Err(e) => tracing::warn!("Failed to load settings from {}: {}", user.display(), e),
            }
        }
    }

    debug!("load_settings: no settings file found, using defaults");
    Ok(T::default())
}

fn load_from_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let content = fs::read_to_string(&path).context("Failed to read settings file")?;
    let settings: T = serde_yaml::from_str(&content).context("Failed to parse settings file")?;
    tracing::info!("Loaded settings from: {}", path.as_ref().display());
    Ok(settings)
}

impl Config {
    pub fn load(settings_path: Option<&PathBuf>) -> Result<Self> {
        load_settings(settings_path)
    }

    /// Overlay the bootstrap file's port and threshold
    pub fn with_bootstrap(mut self, bootstrap: Bootstrap) -> Self {
        self.coordinator.port = bootstrap.port;
        self.coordinator.threshold_secs = bootstrap.threshold_secs;
        self
    }
}
