//! Frame-level text encodings.
//!
//! The codec is bytes-in/bytes-out; base16 and base64 wrap the same binary
//! frame for lobbies whose clients talk over text transports. Incoming
//! text frames are always base16; base64 is outbound only.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::ProtocolError;

/// Encodes a binary frame as lowercase hex, two characters per byte.
pub fn encode_base16(frame: &[u8]) -> String {
    hex::encode(frame)
}

/// Decodes an incoming base16 text frame back to binary.
pub fn decode_base16(text: &str) -> Result<Vec<u8>, ProtocolError> {
    Ok(hex::decode(text)?)
}

/// Encodes a binary frame as standard base64 with padding.
pub fn encode_base64(frame: &[u8]) -> String {
    BASE64.encode(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base16_is_lowercase_two_chars_per_byte() {
        let encoded = encode_base16(&[0x00, 0xAB, 0xFF]);
        assert_eq!(encoded, "00abff");
    }

    #[test]
    fn test_base16_round_trip() {
        let frame = vec![0, 0, 0, 2, 0, 0, 3, 0xEA, 1, 2, 3];
        assert_eq!(decode_base16(&encode_base16(&frame)).unwrap(), frame);
    }

    #[test]
    fn test_base16_rejects_odd_length() {
        assert!(decode_base16("abc").is_err());
    }

    #[test]
    fn test_base16_rejects_non_hex() {
        assert!(decode_base16("zz").is_err());
    }

    #[test]
    fn test_base64_standard_padding() {
        assert_eq!(encode_base64(&[1, 2, 3, 4]), "AQIDBA==");
    }
}
