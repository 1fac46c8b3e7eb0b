//! Hexadecimal byte codec for memory payloads.
//!
//! Raw memory travels over the wire as lowercase hex text: two characters
//! per byte, zero-padded, no separators. `[0xDE, 0xAD]` is `"dead"`.

use thiserror::Error;

/// Errors produced when decoding a hex payload from the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    /// The string does not contain a whole number of bytes.
    #[error("Hex payload has odd length {0}")]
    OddLength(usize),

    /// A character outside `[0-9a-fA-F]` was found.
    #[error("Invalid hex character {c:?} at index {index}")]
    InvalidCharacter {
        /// Offending character
        c: char,
        /// Position in the payload
        index: usize,
    },
}

/// Encode bytes as a lowercase hex string.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string into a byte buffer of length `s.len() / 2`.
///
/// The server sends upper-case dumps; either case is accepted.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, HexError> {
    if s.len() % 2 != 0 {
        return Err(HexError::OddLength(s.len()));
    }
    hex::decode(s).map_err(|err| match err {
        hex::FromHexError::InvalidHexCharacter { c, index } => {
            HexError::InvalidCharacter { c, index }
        }
        _ => HexError::OddLength(s.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_lowercase_and_zero_padded() {
        assert_eq!(encode_hex(&[0xDE, 0xAD, 0xBE, 0xEF]), "deadbeef");
        assert_eq!(encode_hex(&[0x00, 0x01, 0x0A]), "00010a");
        assert_eq!(encode_hex(&[]), "");
    }

    #[test]
    fn test_decode_length_is_half_string_length() {
        let bytes = decode_hex("3f8000004120").unwrap();
        assert_eq!(bytes, vec![0x3F, 0x80, 0x00, 0x00, 0x41, 0x20]);
        assert_eq!(bytes.len(), "3f8000004120".len() / 2);
    }

    #[test]
    fn test_decode_accepts_uppercase() {
        assert_eq!(decode_hex("DEADbeef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_roundtrip_all_byte_values() {
        let all: Vec<u8> = (0..=u8::MAX).collect();
        assert_eq!(decode_hex(&encode_hex(&all)).unwrap(), all);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        assert_eq!(decode_hex("abc"), Err(HexError::OddLength(3)));
    }

    #[test]
    fn test_decode_rejects_non_hex() {
        let err = decode_hex("zz").unwrap_err();
        assert!(matches!(err, HexError::InvalidCharacter { c: 'z', index: 0 }));
        assert_eq!(err.to_string(), "Invalid hex character 'z' at index 0");
    }
}
