//! Participant state machine
//!
//! Mirrors the coordinator's view of this participant. Local state only
//! changes once the coordinator has answered with the matching success
//! notice.

use std::fmt;

use eyre::Result;
use mcast::ParticipantStatus;
use mcast::protocol::{Command, Endpoint, reply};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::ControlClient;
use crate::config::ParticipantConfig;
use crate::receiver::DeliveryReceiver;

pub const ALREADY_REGISTERED: &str = "Participant is already registered";

/// A line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Register { port: u16 },
    Deregister,
    Disconnect,
    Reconnect { port: u16 },
    Msend { text: String },
    Quit,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Unknown command '{0}'")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl UserCommand {
    pub fn parse(line: &str) -> Result<Self, InputError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
        let port = |usage| rest.trim().parse::<u16>().map_err(|_| InputError::Usage(usage));

        match keyword {
            "register" => Ok(Self::Register {
                port: port("register <port>")?,
            }),
            "deregister" => Ok(Self::Deregister),
            "disconnect" => Ok(Self::Disconnect),
            "reconnect" => Ok(Self::Reconnect {
                port: port("reconnect <port>")?,
            }),
            "msend" => Ok(Self::Msend { text: rest.to_string() }),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(InputError::Unknown(other.to_string())),
        }
    }
}

/// Local view of membership, printed in the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub ParticipantStatus);

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ParticipantStatus::Online => f.write_str("online"),
            ParticipantStatus::Offline => f.write_str("offline"),
            ParticipantStatus::NotMember => f.write_str("not a member"),
        }
    }
}

pub struct Participant {
    config: ParticipantConfig,
    client: ControlClient,
    status: ParticipantStatus,
    receiver: Option<DeliveryReceiver>,
}

impl Participant {
    pub fn new(config: ParticipantConfig, client: ControlClient) -> Self {
        Self {
            config,
            client,
            status: ParticipantStatus::NotMember,
            receiver: None,
        }
    }

    pub fn status(&self) -> ParticipantStatus {
        self.status
    }

    pub fn config(&self) -> &ParticipantConfig {
        &self.config
    }

    /// Port the active delivery receiver listens on
    pub fn delivery_port(&self) -> Option<u16> {
        self.receiver.as_ref().map(DeliveryReceiver::port)
    }

    /// Notice a delivery channel the coordinator closed on its own
    ///
    /// The coordinator drops the channel of a participant it failed to push
    /// to and keeps it as an OFFLINE member, so the local view follows.
    pub async fn refresh_status(&mut self) {
        let closed = self.receiver.as_ref().is_some_and(DeliveryReceiver::is_finished);
        if self.status == ParticipantStatus::Online && closed {
            warn!(participant_id = %self.config.id, "Coordinator closed the delivery channel, now offline");
            self.status = ParticipantStatus::Offline;
            self.stop_receiver().await;
        }
    }

    /// Run one user command; returns the line to show the user
    pub async fn execute(&mut self, command: UserCommand) -> Result<String> {
        self.refresh_status().await;
        debug!(?command, status = ?self.status, "Participant::execute: called");
        match command {
            UserCommand::Register { port } => self.register(port).await,
            UserCommand::Deregister => self.deregister().await,
            UserCommand::Disconnect => self.disconnect().await,
            UserCommand::Reconnect { port } => self.reconnect(port).await,
            UserCommand::Msend { text } => Ok(self.client.request(&Command::Msend { payload: text }).await?),
            UserCommand::Quit => {
                self.stop_receiver().await;
                Ok(String::new())
            }
        }
    }

    async fn register(&mut self, port: u16) -> Result<String> {
        if self.status != ParticipantStatus::NotMember {
            return Ok(ALREADY_REGISTERED.to_string());
        }

        let receiver = DeliveryReceiver::bind(port, self.config.log_path.clone()).await?;
        let command = Command::Register {
            id: self.config.id,
            endpoint: self.endpoint(receiver.port()),
        };
        let answer = self.client.request(&command).await;

        match answer {
            Ok(line) if line == reply::REGISTERED => {
                info!(participant_id = %self.config.id, port = receiver.port(), "Registered");
                self.status = ParticipantStatus::Online;
                self.receiver = Some(receiver);
                Ok(line)
            }
            other => {
                stop(receiver).await;
                Ok(other?)
            }
        }
    }

    async fn deregister(&mut self) -> Result<String> {
        let line = self.client.request(&Command::Deregister).await?;
        if line == reply::DEREGISTERED {
            info!(participant_id = %self.config.id, "Deregistered");
            self.status = ParticipantStatus::NotMember;
            self.stop_receiver().await;
        }
        Ok(line)
    }

    async fn disconnect(&mut self) -> Result<String> {
        let line = self.client.request(&Command::Disconnect).await?;
        if line == reply::DISCONNECTED {
            info!(participant_id = %self.config.id, "Disconnected");
            self.status = ParticipantStatus::Offline;
            self.stop_receiver().await;
        }
        Ok(line)
    }

    async fn reconnect(&mut self, port: u16) -> Result<String> {
        let receiver = DeliveryReceiver::bind(port, self.config.log_path.clone()).await?;
        let command = Command::Reconnect {
            endpoint: self.endpoint(receiver.port()),
        };
        let answer = self.client.request(&command).await;

        match answer {
            Ok(line) if line == reply::RECONNECTED => {
                info!(participant_id = %self.config.id, port = receiver.port(), "Reconnected");
                self.stop_receiver().await;
                self.status = ParticipantStatus::Online;
                self.receiver = Some(receiver);
                Ok(line)
            }
            other => {
                stop(receiver).await;
                Ok(other?)
            }
        }
    }

    fn endpoint(&self, port: u16) -> Endpoint {
        Endpoint::new(self.client.local_ip().to_string(), port)
    }

    async fn stop_receiver(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            stop(receiver).await;
        }
    }
}

async fn stop(receiver: DeliveryReceiver) {
    match receiver.stop().await {
        Ok(received) => debug!(received, "stop: delivery receiver stopped"),
        Err(e) => warn!(error = %e, "Delivery receiver failed"),
    }
}
