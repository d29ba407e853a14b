//! Identity types and wire-level enums shared by every layer.

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// A unique identifier for a connected client.
///
/// Newtype over the `u32` that travels on the wire. Client ids are
/// assigned by the main backend and trusted from the join handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl ClientId {
    /// The big-endian bytes of this id, as written into a frame header.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// A unique identifier for a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LobbyId(pub u32);

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

/// A unique identifier for a colony. At most one lobby exists per colony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColonyId(pub u32);

impl fmt::Display for ColonyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col-{}", self.0)
    }
}

/// Numeric event id. An open set keyed through the catalog, so a plain
/// alias rather than a newtype.
pub type MessageId = u32;

/// The sender id used for every server-originated frame.
///
/// Real client ids come from the main backend's user table and never reach
/// this value; joins with it are rejected outright.
pub const SERVER_ID: ClientId = ClientId(u32::MAX);

/// The role a message origin can have inside a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// A regular participant.
    Guest,
    /// The distinguished client whose id equals the lobby's owner id.
    /// Only the owner selects difficulties and drives phase progression.
    Owner,
    /// The server itself.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Owner => write!(f, "owner"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// How frames are encoded on a lobby's transport.
///
/// The codec itself is bytes-in/bytes-out; the encoding is applied at the
/// transport read/write edges only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireEncoding {
    /// Raw binary websocket frames.
    #[default]
    Binary,
    /// Lowercase hex text frames, two characters per byte.
    Base16,
    /// Standard base64 text frames, with padding. Outbound only.
    Base64,
}

impl FromStr for WireEncoding {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "base16" => Ok(Self::Base16),
            "base64" => Ok(Self::Base64),
            other => Err(ProtocolError::InvalidEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for WireEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Base16 => write!(f, "base16"),
            Self::Base64 => write!(f, "base64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_display() {
        assert_eq!(ClientId(7).to_string(), "C-7");
    }

    #[test]
    fn test_client_id_to_be_bytes() {
        assert_eq!(ClientId(0x01020304).to_be_bytes(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_server_id_is_nonzero_max() {
        assert_eq!(SERVER_ID.0, u32::MAX);
        assert_ne!(SERVER_ID.0, 0);
    }

    #[test]
    fn test_wire_encoding_parses_known_names() {
        assert_eq!("binary".parse::<WireEncoding>().unwrap(), WireEncoding::Binary);
        assert_eq!("base16".parse::<WireEncoding>().unwrap(), WireEncoding::Base16);
        assert_eq!("base64".parse::<WireEncoding>().unwrap(), WireEncoding::Base64);
    }

    #[test]
    fn test_wire_encoding_rejects_unknown_name() {
        assert!("base32".parse::<WireEncoding>().is_err());
    }

    #[test]
    fn test_wire_encoding_display_round_trips() {
        for enc in [WireEncoding::Binary, WireEncoding::Base16, WireEncoding::Base64] {
            assert_eq!(enc.to_string().parse::<WireEncoding>().unwrap(), enc);
        }
    }
}
