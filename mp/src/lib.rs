//! mcast participant
//!
//! Connects to a coordinator, issues membership commands typed by the user
//! and writes every message delivered to it into a local log file.

pub mod cli;
pub mod client;
pub mod config;
pub mod log;
pub mod participant;
pub mod receiver;

pub use client::{ClientError, ControlClient};
pub use config::{ParticipantConfig, ParticipantSettings, Settings};
pub use log::MessageLog;
pub use participant::{Participant, UserCommand};
pub use receiver::DeliveryReceiver;
