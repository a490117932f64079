//! Base64 chunking for in-band transfer
//!
//! The relay path moves bytes out of band and never uses this. It is kept
//! for pushing small payloads through the metadata channel itself, where
//! each record must stay small.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::WormholeError;

/// Default segment length in base64 characters
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Split a base64 string into segments of at most `chunk_size` characters.
///
/// Base64 is ASCII, so byte offsets are always character boundaries.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn split_base64(encoded: &str, chunk_size: usize) -> Vec<String> {
    assert!(chunk_size > 0, "chunk size must be non-zero");
    encoded
        .as_bytes()
        .chunks(chunk_size)
        .map(|segment| String::from_utf8_lossy(segment).into_owned())
        .collect()
}

/// Encode raw bytes and split the result.
pub fn encode_chunks(data: &[u8], chunk_size: usize) -> Vec<String> {
    split_base64(&STANDARD.encode(data), chunk_size)
}

/// Join segments back and decode them.
pub fn decode_chunks<S: AsRef<str>>(chunks: &[S]) -> Result<Vec<u8>, WormholeError> {
    let joined: String = chunks.iter().map(|c| c.as_ref()).collect();
    STANDARD
        .decode(joined)
        .map_err(|e| WormholeError::Serialization(format!("Invalid base64 chunk: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_exact_and_remainder() {
        let chunks = split_base64("abcdefgh", 3);
        assert_eq!(chunks, vec!["abc", "def", "gh"]);

        let chunks = split_base64("abcdef", 3);
        assert_eq!(chunks, vec!["abc", "def"]);
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        assert!(split_base64("", 4).is_empty());
        assert!(encode_chunks(&[], 4).is_empty());
    }

    #[test]
    fn test_chunks_decode_to_original() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let chunks = encode_chunks(&data, 100);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert_eq!(decode_chunks(&chunks).unwrap(), data);
    }

    #[test]
    fn test_corrupt_chunk_is_rejected() {
        let err = decode_chunks(&["@@@@"]).unwrap_err();
        assert!(err.to_string().contains("Invalid base64"));
    }

    #[test]
    #[should_panic(expected = "chunk size must be non-zero")]
    fn test_zero_chunk_size_panics() {
        split_base64("abc", 0);
    }
}
