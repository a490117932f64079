//! Property-based tests for codes, chunking and progress
//!
//! Uses proptest to check invariants that hold for any input.

use proptest::prelude::*;
use wormhole_core::chunk::{decode_chunks, encode_chunks, split_base64};
use wormhole_core::{Progress, TransferCode};

// ============================================================================
// Strategy Generators
// ============================================================================

/// Words a user might type, separated by arbitrary whitespace
fn typed_code_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-zA-Z0-9]{1,8}", 1..5).prop_flat_map(|words| {
        let gaps = prop::collection::vec("[ \t]{1,3}", words.len());
        (Just(words), gaps).prop_map(|(words, gaps)| {
            words
                .iter()
                .zip(gaps.iter())
                .map(|(w, g)| format!("{}{}", g, w))
                .collect::<String>()
        })
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Generated codes always parse back to themselves
    #[test]
    fn generated_codes_are_well_formed(_seed in 0u8..255) {
        let code = TransferCode::generate();
        prop_assert!(code.is_well_formed());
        let parsed = TransferCode::parse(code.as_str()).unwrap();
        prop_assert_eq!(parsed, code);
    }

    /// Parsing is idempotent and never leaves whitespace or uppercase
    #[test]
    fn parse_normalizes(input in typed_code_strategy()) {
        let code = TransferCode::parse(&input).unwrap();
        prop_assert!(!code.as_str().chars().any(char::is_whitespace));
        prop_assert_eq!(code.as_str().to_lowercase(), code.as_str());
        prop_assert_eq!(TransferCode::parse(code.as_str()).unwrap(), code.clone());
        prop_assert_eq!(code.completion_key(), format!("{}-received", code));
    }

    /// No segment exceeds the chunk size and the pieces decode to the input
    #[test]
    fn chunks_respect_size(data in prop::collection::vec(any::<u8>(), 0..4096), size in 1usize..512) {
        let chunks = encode_chunks(&data, size);
        prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
        prop_assert_eq!(decode_chunks(&chunks).unwrap(), data);
    }

    /// Splitting only cuts, it never changes content
    #[test]
    fn split_concatenates_back(encoded in "[A-Za-z0-9+/]{0,300}", size in 1usize..64) {
        let joined: String = split_base64(&encoded, size).concat();
        prop_assert_eq!(joined, encoded);
    }

    /// Percentages stay in range and grow with the byte count
    #[test]
    fn progress_is_bounded_and_monotonic(total in 0u64..10_000_000, a in 0u64..10_000_000, b in 0u64..10_000_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let p_lo = Progress::new(lo, total).progress;
        let p_hi = Progress::new(hi, total).progress;
        prop_assert!(p_hi <= 100);
        prop_assert!(p_lo <= p_hi);
    }
}
