//! Outbound delivery channel to one participant
//!
//! The coordinator is the connecting side; the participant listens. Only
//! frames flow on this channel, never replies.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::{Endpoint, FrameError, ProtocolError, write_frame};

/// Errors from pushing a payload
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("push timed out after {0:?}")]
    Timeout(Duration),

    #[error("participant has no delivery channel")]
    NotConnected,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Open delivery channel, owned by exactly one participant record
pub struct DeliveryChannel {
    peer: String,
    writer: BufWriter<Writer>,
}

impl fmt::Debug for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryChannel").field("peer", &self.peer).finish()
    }
}

impl DeliveryChannel {
    /// Connect to the participant's delivery listener
    pub async fn open(endpoint: &Endpoint, timeout: Duration) -> Result<Self, ProtocolError> {
        debug!(%endpoint, ?timeout, "DeliveryChannel::open: called");
        let unreachable = |reason: String| ProtocolError::DeliveryUnreachable {
            endpoint: endpoint.clone(),
            reason,
        };

        let stream = tokio::time::timeout(timeout, TcpStream::connect((endpoint.host.as_str(), endpoint.port)))
            .await
            .map_err(|_| unreachable(format!("timed out after {:?}", timeout)))?
            .map_err(|e| unreachable(e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "DeliveryChannel::open: set_nodelay failed");
        }

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| endpoint.to_string());
        debug!(%peer, "DeliveryChannel::open: connected");
        Ok(Self::from_writer(peer, stream))
    }

    /// Wrap any writer as a delivery channel
    pub fn from_writer(peer: impl Into<String>, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            peer: peer.into(),
            writer: BufWriter::new(Box::new(writer)),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Push one payload as a frame, bounded by `timeout`
    pub async fn push(&mut self, payload: &str, timeout: Duration) -> Result<(), DeliveryError> {
        match tokio::time::timeout(timeout, write_frame(&mut self.writer, payload)).await {
            Ok(result) => result.map_err(DeliveryError::from),
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        }
    }

    /// Flush and shut down the write side; errors are only logged
    pub async fn close(mut self) {
        debug!(peer = %self.peer, "DeliveryChannel::close: called");
        if let Err(e) = self.writer.shutdown().await {
            debug!(peer = %self.peer, error = %e, "DeliveryChannel::close: shutdown failed");
        }
    }
}
