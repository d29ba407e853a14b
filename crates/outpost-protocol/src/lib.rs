//! Wire protocol for the Outpost lobby server.
//!
//! Defines the frame format (`senderId ‖ eventId ‖ payload`, all big
//! endian), the declarative event catalog, typed payloads with their
//! codecs, and the base16/base64 frame encodings.

mod error;
mod framing;
mod structure;
mod types;

pub mod events;
pub mod payloads;

pub use error::ProtocolError;
pub use framing::{decode_base16, encode_base16, encode_base64};
pub use structure::{FieldKind, FieldSpec, MESSAGE_HEADER_SIZE};
pub use types::{ClientId, ColonyId, LobbyId, MessageId, Role, WireEncoding, SERVER_ID};

pub use events::{catalog, EventCatalog, EventSpec, HandlerKind, Permissions};
pub use payloads::{deserialize, extract_header, serialize, EventPayload, PayloadReader, WireField};
