//! mcast - coordinator-mediated multicast
//!
//! Participants join a group through a coordinator over a line-based control
//! channel. The coordinator opens a delivery channel back to each ONLINE
//! participant and pushes every `msend` payload over it. Messages for
//! OFFLINE participants are buffered and replayed on reconnect if they are
//! no older than the configured threshold.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod logging;
pub mod protocol;

pub use config::{Bootstrap, Config, ConfigError};
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorMetrics, Group, ParticipantStatus};
pub use protocol::{Command, Endpoint, ParticipantId, ProtocolError, Reply};
