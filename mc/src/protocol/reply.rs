//! Control-channel replies
//!
//! Every command yields exactly one reply line. The texts are part of the wire
//! contract: participants compare them verbatim.

use std::fmt;

use thiserror::Error;

use super::command::{Endpoint, ParticipantId};

pub const CONNECTION_ACCEPTED: &str = "Coordinator accepted connection with Participant";
pub const CONNECTION_REJECTED: &str = "Coordinator cannot accept a new participant currently.Please check later";
pub const REGISTERED: &str = "Participant is added to the multicast group";
pub const DEREGISTERED: &str = "Participant is removed from multicast group";
pub const DISCONNECTED: &str = "Participant is disconnected and will receive messages when it comes online";
pub const RECONNECTED: &str = "Participant is reconnected and will be receiving messages sent within threshold";
pub const MSEND_ACCEPTED: &str =
    "Multicast message is received by coordinator and will be send to all the participants";
pub const INVALID_INPUT: &str = "Invalid input";

/// Membership and delivery failures reported back to the offending session
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Participant with same id already exists")]
    DuplicateParticipant(ParticipantId),

    #[error("Participant is not registered.Please check")]
    NotAMember,

    #[error("Participant is already registered as {0}")]
    AlreadyRegistered(ParticipantId),

    #[error("Participant is already online")]
    AlreadyOnline(ParticipantId),

    #[error("Unable to open delivery channel to {endpoint}: {reason}")]
    DeliveryUnreachable { endpoint: Endpoint, reason: String },

    #[error("Invalid input: payload too large ({0} bytes)")]
    PayloadTooLarge(usize),
}

/// One reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    ConnectionAccepted,
    ConnectionRejected,
    Registered,
    Deregistered,
    Disconnected,
    Reconnected,
    MsendAccepted,
    /// Unrecognized command keyword
    InvalidInput,
    /// Known keyword, malformed arguments
    InvalidArguments(String),
    Failed(ProtocolError),
}

/// True for a reply line that reports a completed command
pub fn is_success(line: &str) -> bool {
    [
        CONNECTION_ACCEPTED,
        REGISTERED,
        DEREGISTERED,
        DISCONNECTED,
        RECONNECTED,
        MSEND_ACCEPTED,
    ]
    .contains(&line)
}

impl From<ProtocolError> for Reply {
    fn from(err: ProtocolError) -> Self {
        Self::Failed(err)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionAccepted => f.write_str(CONNECTION_ACCEPTED),
            Self::ConnectionRejected => f.write_str(CONNECTION_REJECTED),
            Self::Registered => f.write_str(REGISTERED),
            Self::Deregistered => f.write_str(DEREGISTERED),
            Self::Disconnected => f.write_str(DISCONNECTED),
            Self::Reconnected => f.write_str(RECONNECTED),
            Self::MsendAccepted => f.write_str(MSEND_ACCEPTED),
            Self::InvalidInput => f.write_str(INVALID_INPUT),
            Self::InvalidArguments(reason) => write!(f, "{}: {}", INVALID_INPUT, reason),
            Self::Failed(err) => write!(f, "{}", err),
        }
    }
}
