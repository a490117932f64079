//! Status events reported by the transfer coordinator
//!
//! Events are transient: nothing here is persisted, and a status label is
//! not a recoverable state machine.
//!
//! ```text
//! send:     uploading → pinning → sent → completed → unpinning → unpinned
//!                                   │                        └─→ cleanup-failed
//!                                   └─→ expired (bounded wait only)
//!           uploading → error
//!
//! receive:  connecting → downloading → progress* → downloaded
//!           connecting → error
//! ```

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::code::TransferCode;
use crate::types::TransferDescriptor;

/// Status label of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    /// Sender is pushing bytes to the relay
    Uploading,
    /// Upload done, descriptor being published
    Pinning,
    /// Descriptor published; the code is ready to share
    Sent,
    /// Receiver reported the download finished
    Completed,
    /// Asking the relay to drop its pin
    Unpinning,
    /// Relay released the pin
    Unpinned,
    /// Unpin failed; the relay's own GC will reclaim the content
    CleanupFailed,
    /// Sender stopped waiting for completion
    Expired,
    /// Receiver is looking up the code
    Connecting,
    /// Descriptor found, fetching content
    Downloading,
    /// Bytes received so far
    Progress,
    /// Full payload available
    Downloaded,
    /// Terminal failure
    Error,
}

impl TransferStatus {
    /// Wire label, e.g. `"cleanup-failed"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Uploading => "uploading",
            TransferStatus::Pinning => "pinning",
            TransferStatus::Sent => "sent",
            TransferStatus::Completed => "completed",
            TransferStatus::Unpinning => "unpinning",
            TransferStatus::Unpinned => "unpinned",
            TransferStatus::CleanupFailed => "cleanup-failed",
            TransferStatus::Expired => "expired",
            TransferStatus::Connecting => "connecting",
            TransferStatus::Downloading => "downloading",
            TransferStatus::Progress => "progress",
            TransferStatus::Downloaded => "downloaded",
            TransferStatus::Error => "error",
        }
    }

    /// Whether no further events follow for this operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Unpinned
                | TransferStatus::CleanupFailed
                | TransferStatus::Expired
                | TransferStatus::Downloaded
                | TransferStatus::Error
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Download progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Percentage, 0 to 100
    pub progress: u8,
    /// Bytes received so far
    pub loaded: u64,
    /// Total bytes as reported by the relay
    pub total: u64,
}

impl Progress {
    /// Compute the percentage, clamped to 100 if the relay under-reported.
    pub fn new(loaded: u64, total: u64) -> Self {
        let progress = if total == 0 {
            100
        } else {
            ((loaded as u128 * 100) / total as u128).min(100) as u8
        };
        Self {
            progress,
            loaded,
            total,
        }
    }
}

/// A received file, ready to be written out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    /// File contents
    pub bytes: Bytes,
    /// Name from the descriptor
    pub filename: String,
    /// MIME type from the descriptor
    pub mime_type: String,
}

/// One status report
#[derive(Debug, Clone)]
pub struct StatusEvent {
    /// Transfer the event belongs to
    pub code: TransferCode,
    /// Status label
    pub status: TransferStatus,
    /// Human-readable message
    pub message: String,
    /// Descriptor, attached from `downloading` on
    pub metadata: Option<TransferDescriptor>,
    /// Payload, attached to `downloaded`
    pub file_data: Option<FileData>,
    /// Attached to `progress`
    pub progress: Option<Progress>,
}

impl StatusEvent {
    /// Event with just a status and message.
    pub fn new(code: &TransferCode, status: TransferStatus, message: impl Into<String>) -> Self {
        Self {
            code: code.clone(),
            status,
            message: message.into(),
            metadata: None,
            file_data: None,
            progress: None,
        }
    }

    /// Attach the transfer descriptor.
    pub fn with_metadata(mut self, metadata: TransferDescriptor) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach the downloaded file.
    pub fn with_file_data(mut self, file_data: FileData) -> Self {
        self.file_data = Some(file_data);
        self
    }

    /// Attach progress.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// The coordinator's single observer.
///
/// Sending never blocks; if the observer went away, events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the observer reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Wrap an existing sender.
    pub fn from_sender(tx: mpsc::UnboundedSender<StatusEvent>) -> Self {
        Self { tx }
    }

    /// Deliver an event.
    pub fn emit(&self, event: StatusEvent) {
        debug!(code = %event.code, status = %event.status, message = %event.message, "status");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(TransferStatus::CleanupFailed.to_string(), "cleanup-failed");
        assert_eq!(TransferStatus::Downloaded.as_str(), "downloaded");
        assert_eq!(format!("{}", TransferStatus::Sent), "sent");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransferStatus::Error.is_terminal());
        assert!(TransferStatus::Unpinned.is_terminal());
        assert!(!TransferStatus::Sent.is_terminal());
        assert!(!TransferStatus::Progress.is_terminal());
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(Progress::new(0, 10).progress, 0);
        assert_eq!(Progress::new(5, 10).progress, 50);
        assert_eq!(Progress::new(10, 10).progress, 100);
        assert_eq!(Progress::new(3, 7).progress, 42);
    }

    #[test]
    fn test_progress_clamps_when_total_is_understated() {
        assert_eq!(Progress::new(15, 10).progress, 100);
        assert_eq!(Progress::new(1, 0).progress, 100);
    }

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        let code = TransferCode::parse("42-brave-fire").unwrap();

        sink.emit(StatusEvent::new(&code, TransferStatus::Connecting, "looking up"));
        sink.emit(StatusEvent::new(&code, TransferStatus::Error, "gone"));

        assert_eq!(rx.recv().await.unwrap().status, TransferStatus::Connecting);
        assert_eq!(rx.recv().await.unwrap().status, TransferStatus::Error);
    }

    #[test]
    fn test_emit_after_observer_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        let code = TransferCode::parse("1-kind-moon").unwrap();
        sink.emit(StatusEvent::new(&code, TransferStatus::Sent, "ok"));
    }
}
