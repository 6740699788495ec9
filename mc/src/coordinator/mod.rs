//! Coordinator: group membership, fan-out, and the control-session server
//!
//! - [`ParticipantRegistry`] owns the membership map
//! - [`Dispatcher`] fans `msend` payloads out and replays buffered ones
//! - [`Group`] applies membership commands on behalf of a session
//! - [`Coordinator`] accepts control connections into a bounded worker pool

mod config;
mod delivery;
mod dispatch;
mod group;
mod metrics;
mod registry;
mod server;
mod session;

pub use config::CoordinatorConfig;
pub use delivery::{DeliveryChannel, DeliveryError};
pub use dispatch::{Dispatcher, FanoutReport, ReplayReport};
pub use group::Group;
pub use metrics::{CoordinatorMetrics, Metrics};
pub use registry::{BufferedMessage, ParticipantRecord, ParticipantRegistry, ParticipantStatus, RecordHandle};
pub use server::Coordinator;
pub use session::CommandSession;
