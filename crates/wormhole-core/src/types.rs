//! Records exchanged through the metadata channel

use serde::{Deserialize, Serialize};

/// Status value the receiver writes once the download is complete
pub const COMPLETED_STATUS: &str = "completed";

/// Current time as unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// What the sender publishes under the code.
///
/// Written once and never updated; a second send that draws the same code
/// replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDescriptor {
    /// Original file name (no directories)
    pub filename: String,
    /// Payload length in bytes
    pub size: u64,
    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Relay content hash used to fetch the bytes
    pub content_hash: String,
    /// Unix millis when the descriptor was created
    pub created_at: i64,
}

impl TransferDescriptor {
    /// Build a descriptor stamped with the current time.
    pub fn new(
        filename: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            size,
            mime_type: mime_type.into(),
            content_hash: content_hash.into(),
            created_at: now_millis(),
        }
    }

    /// A descriptor is only usable if it points at some content.
    pub fn has_content_hash(&self) -> bool {
        !self.content_hash.trim().is_empty()
    }
}

/// Minimal record in the GC index, so stale transfers can be found without
/// fetching full descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    /// Same timestamp as the descriptor
    pub created_at: i64,
}

/// Receiver to sender: the file arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSignal {
    /// Always `"completed"` when written by us
    pub status: String,
    /// Unix millis when the download finished
    pub timestamp: i64,
}

impl CompletionSignal {
    /// Signal stamped with the current time.
    pub fn completed() -> Self {
        Self {
            status: COMPLETED_STATUS.to_string(),
            timestamp: now_millis(),
        }
    }

    /// Whether this signal reports a finished download.
    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED_STATUS
    }
}
