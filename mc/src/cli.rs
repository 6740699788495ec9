//! Coordinator command line

use clap::Parser;
use std::path::PathBuf;

/// mcast coordinator
#[derive(Debug, Parser)]
#[command(
    name = "mcast-coordinator",
    about = "Coordinator for a multicast group with buffered catch-up delivery",
    version
)]
pub struct Cli {
    /// Bootstrap file: listen port on line 1, replay threshold (seconds) on line 2
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Path to YAML settings file
    #[arg(short, long, help = "Path to YAML settings file")]
    pub settings: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,
}
