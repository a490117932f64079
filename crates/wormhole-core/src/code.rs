//! Rendezvous codes
//!
//! A transfer code is a short mnemonic like `42-brave-fire` that both sides
//! type to find the same transfer record. Codes are meant to be read aloud
//! and discarded quickly, so they carry little entropy: two concurrent
//! sends can draw the same code, and the later descriptor wins.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::WormholeError;

/// Highest number drawn for the numeric prefix
const MAX_NUMBER: u32 = 99;

/// Adjectives for the middle word. Short, easy to spell, no homophones.
const ADJECTIVES: &[&str] = &[
    "brave", "calm", "clever", "cosmic", "crisp", "daring", "eager", "fancy",
    "gentle", "golden", "happy", "hidden", "humble", "jolly", "kind", "lively",
    "lucky", "mighty", "noble", "proud", "quick", "quiet", "rapid", "shiny",
    "silent", "smooth", "sunny", "swift", "tidy", "vivid", "warm", "witty",
];

/// Nouns for the last word.
const NOUNS: &[&str] = &[
    "anchor", "apple", "badger", "cloud", "comet", "coral", "dragon", "eagle",
    "falcon", "fire", "forest", "garden", "harbor", "island", "lantern", "meadow",
    "moon", "ocean", "otter", "panda", "pebble", "planet", "river", "rocket",
    "shadow", "spark", "storm", "tiger", "tulip", "valley", "willow", "zephyr",
];

/// A rendezvous code shared between sender and receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferCode(String);

impl TransferCode {
    /// Draw a fresh `<number>-<adjective>-<noun>` code.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let number = rng.random_range(0..=MAX_NUMBER);
        let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
        let noun = NOUNS[rng.random_range(0..NOUNS.len())];
        Self(format!("{}-{}-{}", number, adjective, noun))
    }

    /// Normalize a code typed by a user.
    ///
    /// Trims, lowercases and joins whitespace-separated words with `-`.
    /// Codes that do not look generated are still accepted; lookup is by
    /// key, and an unknown key simply times out.
    pub fn parse(input: &str) -> Result<Self, WormholeError> {
        let normalized = input
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();

        if normalized.is_empty() {
            return Err(WormholeError::InvalidCode(input.to_string()));
        }

        Ok(Self(normalized))
    }

    /// Whether this code has the shape `generate()` produces.
    pub fn is_well_formed(&self) -> bool {
        let mut parts = self.0.splitn(3, '-');
        let (Some(number), Some(adjective), Some(noun)) = (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };

        number
            .parse::<u32>()
            .map(|n| n <= MAX_NUMBER)
            .unwrap_or(false)
            && ADJECTIVES.contains(&adjective)
            && NOUNS.contains(&noun)
    }

    /// Key of the completion signal the receiver writes for this code.
    pub fn completion_key(&self) -> String {
        format!("{}-received", self.0)
    }

    /// Borrow the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TransferCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
