//! Tracing setup shared by the coordinator and participant binaries

use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

/// Resolve the log level with priority CLI > settings file > INFO
pub fn resolve_level(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Level {
    match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "INFO" => Level::INFO,
            "WARN" | "WARNING" => Level::WARN,
            "ERROR" => Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                Level::INFO
            }
        },
        None => Level::INFO,
    }
}

/// Install the global subscriber, writing to `log_file` if given or stderr
pub fn setup_logging(level: Level, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_env_filter(filter)
                .try_init()
                .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .try_init()
                .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;
        }
    }

    info!("Logging initialized (level: {:?})", level);
    debug!(?log_file, "setup_logging: done");
    Ok(())
}
