//! Error types for the protocol layer.

use crate::types::{MessageId, Role};

/// Errors that can occur while building the event catalog, extracting
/// message headers, or encoding/decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The message (or remainder) is shorter than the event's declared
    /// minimum size.
    #[error("message too short: expected at least {expected} bytes, got {got}")]
    ShortMessage { expected: u32, got: usize },

    /// The event id in the header is not registered in the catalog.
    #[error("unknown event id {0}")]
    UnknownEventId(MessageId),

    /// The sender's role is not in the event's permitted-senders set.
    #[error("{role} clients may not send {event}")]
    UnauthorizedSender {
        event: &'static str,
        role: Role,
    },

    /// An event's declared structure violates the simplified message
    /// format (variable-size field not last, or more than one of them).
    #[error("invalid event structure: {0}")]
    SchemaMismatch(String),

    /// The terminal string field of a payload is not valid UTF-8.
    #[error("payload string is not valid UTF-8")]
    InvalidUtf8,

    /// Two event specifications were registered under the same id.
    /// Fatal at startup.
    #[error("event id {id} registered twice: {existing} and {new}")]
    IdClash {
        id: MessageId,
        existing: &'static str,
        new: &'static str,
    },

    /// A text frame could not be base16-decoded.
    #[error("invalid base16 frame: {0}")]
    InvalidBase16(#[from] hex::FromHexError),

    /// An encoding name did not parse (expected base16, base64 or binary).
    #[error("unknown wire encoding {0:?}")]
    InvalidEncoding(String),
}
