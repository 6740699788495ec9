//! Control-channel commands
//!
//! The keyword is split off at the first space; arguments are comma separated.
//! `msend` is the exception: its payload is the rest of the line, verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric participant identifier, unique within the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(ParticipantId)
            .map_err(|_| ParseError::InvalidId(s.to_string()))
    }
}

/// Errors from parsing a control line
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("invalid participant id '{0}'")]
    InvalidId(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Host and port where a participant accepts its delivery channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse the `<host>,<port>` form used by `reconnect`
    fn parse_args<'a>(mut args: impl Iterator<Item = &'a str>) -> Result<Self, ParseError> {
        let host = args
            .next()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(ParseError::MissingArgument("host"))?;
        let port = args.next().ok_or(ParseError::MissingArgument("port"))?;
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ParseError::InvalidPort(port.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A command sent by a participant over its control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join the group and open a delivery channel to `endpoint`
    Register { id: ParticipantId, endpoint: Endpoint },

    /// Leave the group
    Deregister,

    /// Stay a member but stop receiving; messages are buffered
    Disconnect,

    /// Come back online at `endpoint` and catch up on buffered messages
    Reconnect { endpoint: Endpoint },

    /// Multicast `payload` to the whole group
    Msend { payload: String },
}

impl Command {
    pub const REGISTER: &'static str = "register";
    pub const DEREGISTER: &'static str = "deregister";
    pub const DISCONNECT: &'static str = "disconnect";
    pub const RECONNECT: &'static str = "reconnect";
    pub const MSEND: &'static str = "msend";

    /// Parse one control line (trailing `\r`/`\n` are ignored)
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (keyword, rest) = match line.split_once(' ') {
            Some((keyword, rest)) => (keyword, Some(rest)),
            None => (line, None),
        };

        match keyword {
            "" => Err(ParseError::Empty),
            Self::REGISTER => {
                let mut args = rest.ok_or(ParseError::MissingArgument("participant id"))?.split(',');
                let id = args
                    .next()
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(ParseError::MissingArgument("participant id"))?
                    .parse::<ParticipantId>()?;
                let endpoint = Endpoint::parse_args(args)?;
                Ok(Self::Register { id, endpoint })
            }
            Self::DEREGISTER => Ok(Self::Deregister),
            Self::DISCONNECT => Ok(Self::Disconnect),
            Self::RECONNECT => {
                let args = rest.ok_or(ParseError::MissingArgument("host"))?.split(',');
                Ok(Self::Reconnect {
                    endpoint: Endpoint::parse_args(args)?,
                })
            }
            Self::MSEND => {
                let payload = rest.ok_or(ParseError::MissingArgument("payload"))?;
                Ok(Self::Msend {
                    payload: payload.to_string(),
                })
            }
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }

    /// The command keyword, for logging
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Register { .. } => Self::REGISTER,
            Self::Deregister => Self::DEREGISTER,
            Self::Disconnect => Self::DISCONNECT,
            Self::Reconnect { .. } => Self::RECONNECT,
            Self::Msend { .. } => Self::MSEND,
        }
    }
}

/// Renders the wire form, without the trailing newline
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { id, endpoint } => {
                write!(f, "{} {},{},{}", Self::REGISTER, id, endpoint.host, endpoint.port)
            }
            Self::Deregister => f.write_str(Self::DEREGISTER),
            Self::Disconnect => f.write_str(Self::DISCONNECT),
            Self::Reconnect { endpoint } => write!(f, "{} {},{}", Self::RECONNECT, endpoint.host, endpoint.port),
            Self::Msend { payload } => write!(f, "{} {}", Self::MSEND, payload),
        }
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
