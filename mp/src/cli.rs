//! Participant command line

use clap::Parser;
use std::path::PathBuf;

/// mcast participant
#[derive(Debug, Parser)]
#[command(
    name = "mcast-participant",
    about = "Interactive participant for an mcast coordinator",
    version
)]
pub struct Cli {
    /// Bootstrap file: id, message-log path, "<coordinator-host> <coordinator-port>"
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Path to YAML settings file
    #[arg(short, long, help = "Path to YAML settings file")]
    pub settings: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,
}
