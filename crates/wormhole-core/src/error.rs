//! Error types for Wormhole

use std::time::Duration;

use thiserror::Error;

/// Failure talking to the content-addressed relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Relay could not be reached or the response body could not be read
    #[error("Relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Relay answered with a non-success status
    #[error("{message}")]
    Status {
        /// HTTP status code returned by the relay
        status: u16,
        /// Relay-reported error, or a generic message carrying the status
        message: String,
    },

    /// Upload succeeded at the HTTP level but no content hash came back
    #[error("Relay response did not include a content hash")]
    MissingHash,

    /// Relay body was not the JSON we expected
    #[error("Unexpected relay response: {0}")]
    Decode(String),

    /// Relay base URL cannot carry the endpoint path
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),
}

impl RelayError {
    /// HTTP status carried by this error, if the relay answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::Status { status, .. } => Some(*status),
            RelayError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Failure talking to the metadata store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store could not be reached
    #[error("Store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Store answered with an unexpected status
    #[error("Store returned HTTP {0}")]
    Status(u16),

    /// Value could not be encoded or decoded
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store base URL cannot carry a key path
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),

    /// The store is shut down
    #[error("Store is closed")]
    Closed,
}

/// Main error type for Wormhole operations
#[derive(Error, Debug)]
pub enum WormholeError {
    /// Relay rejected or could not take the upload
    #[error("{0}")]
    Upload(RelayError),

    /// No descriptor showed up under the code within the bound
    #[error("No transfer found for code '{code}' within {timeout:?}")]
    DescriptorTimeout {
        /// Code that was looked up
        code: String,
        /// How long we waited
        timeout: Duration,
    },

    /// A value exists under the code but it is not a usable descriptor
    #[error("Invalid code '{0}': no transfer descriptor with a content hash")]
    InvalidCode(String),

    /// Content could not be fetched from the relay
    #[error("Download failed for code '{code}': {source}")]
    Download {
        /// Code of the transfer being received
        code: String,
        /// Underlying relay failure
        #[source]
        source: RelayError,
    },

    /// Unpin failed after completion
    #[error("Cleanup failed for {hash}: {source}")]
    Cleanup {
        /// Content hash we tried to unpin
        hash: String,
        /// Underlying relay failure
        #[source]
        source: RelayError,
    },

    /// Unusable settings (bad relay or store URL)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Metadata store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

/// Result type alias using WormholeError
pub type WormholeResult<T> = Result<T, WormholeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_code_and_bound() {
        let err = WormholeError::DescriptorTimeout {
            code: "does-not-exist".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(
            err.to_string(),
            "No transfer found for code 'does-not-exist' within 1s"
        );
    }

    #[test]
    fn test_upload_error_uses_relay_message() {
        let err = WormholeError::Upload(RelayError::Status {
            status: 413,
            message: "File too large".to_string(),
        });
        assert_eq!(err.to_string(), "File too large");
    }

    #[test]
    fn test_download_error_embeds_status() {
        let err = WormholeError::Download {
            code: "7-calm-river".to_string(),
            source: RelayError::Status {
                status: 404,
                message: "Relay returned HTTP 404".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("7-calm-river"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WormholeError = io_err.into();
        assert!(matches!(err, WormholeError::Io(_)));
    }
}
