//! Wire protocol shared by the coordinator and its participants
//!
//! Two channels exist between a participant and the coordinator:
//!
//! - **Control channel** (participant connects): newline-delimited text. One
//!   command per line, exactly one reply line per command. See [`Command`]
//!   and [`Reply`].
//! - **Delivery channel** (coordinator connects): push-only stream of
//!   length-prefixed UTF-8 frames carrying `msend` payloads. See [`frame`].

pub mod command;
pub mod frame;
pub mod line;
pub mod reply;

pub use command::{Command, Endpoint, ParseError, ParticipantId};
pub use frame::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use line::{DEFAULT_MAX_LINE_BYTES, read_line, read_line_bytes, write_line};
pub use reply::{ProtocolError, Reply};
