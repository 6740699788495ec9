//! Control-channel client
//!
//! One TCP connection to the coordinator for the participant's whole life.
//! Each command is one line out and one reply line back.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use mcast::protocol::{Command, read_line, reply, write_line};
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};

const MAX_REPLY_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The coordinator refused the connection; carries its notice
    #[error("{0}")]
    Rejected(String),

    #[error("Coordinator closed the connection")]
    Closed,

    #[error("No reply from coordinator within {0:?}")]
    Timeout(Duration),

    #[error("Failed to connect to coordinator: {0}")]
    Io(#[from] io::Error),

    #[error("Control channel error: {0}")]
    Transport(String),

    /// An earlier command went unanswered; its reply may still arrive
    #[error("Control channel out of step after an unanswered command")]
    OutOfStep,
}

impl ClientError {
    /// The control connection cannot carry further commands
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Rejected(_) | Self::Io(_))
    }
}

pub struct ControlClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    local_ip: IpAddr,
    timeout: Duration,
    out_of_step: bool,
}

impl ControlClient {
    /// Connect and complete the admission handshake
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ClientError> {
        debug!(%host, port, "ControlClient::connect: called");
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ClientError::Timeout(timeout))??;
        let local_ip = stream.local_addr()?.ip();

        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            local_ip,
            timeout,
            out_of_step: false,
        };

        let handshake = client.read_reply().await?;
        if handshake != reply::CONNECTION_ACCEPTED {
            debug!(%handshake, "ControlClient::connect: rejected");
            return Err(ClientError::Rejected(handshake));
        }
        Ok(client)
    }

    /// Local address of the control connection, announced as the delivery host
    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    /// Send one command and wait for its reply line
    ///
    /// After a reply timeout every later request fails with
    /// [`ClientError::OutOfStep`]; the late reply would otherwise be read as
    /// the answer to the next command.
    pub async fn request(&mut self, command: &Command) -> Result<String, ClientError> {
        debug!(keyword = command.keyword(), "ControlClient::request: called");
        if self.out_of_step {
            return Err(ClientError::OutOfStep);
        }
        write_line(&mut self.writer, &command.to_string())
            .await
            .map_err(|e| ClientError::Transport(format!("{:#}", e)))?;

        let reply = self.read_reply().await;
        if let Err(ClientError::Timeout(after)) = &reply {
            warn!(keyword = command.keyword(), ?after, "No reply from coordinator, control channel unusable");
            self.out_of_step = true;
        }
        reply
    }

    async fn read_reply(&mut self) -> Result<String, ClientError> {
        let line = tokio::time::timeout(self.timeout, read_line(&mut self.reader, MAX_REPLY_BYTES))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
            .map_err(|e| ClientError::Transport(format!("{:#}", e)))?;
        line.ok_or(ClientError::Closed)
    }
}
