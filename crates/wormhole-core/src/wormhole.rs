//! Transfer coordinator
//!
//! `WormholeCore` runs both halves of a transfer and reports progress to a
//! single observer through [`EventSink`].
//!
//! ## Send
//!
//! ```text
//! generate code ─→ upload to relay ─→ publish descriptor ─→ Sent (send returns)
//!                                                   │
//!                       SendSession task ◄──────────┘
//!                       └── first "<code>-received" ─→ unpin ─→ Unpinned | CleanupFailed
//! ```
//!
//! ## Receive
//!
//! ```text
//! fetch descriptor (bounded) ─→ stream content ─→ Downloaded ─→ write "<code>-received"
//! ```
//!
//! Only the upload can fail `send`. Everything after `Sent`, and every step
//! of `receive`, reports through events.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{MetadataChannel, MetadataStore, Subscription};
use crate::code::TransferCode;
use crate::config::WormholeConfig;
use crate::error::{StoreError, WormholeError, WormholeResult};
use crate::events::{EventSink, FileData, Progress, StatusEvent, TransferStatus};
use crate::relay::RelayClient;
use crate::types::{CompletionSignal, TransferDescriptor};

/// How the sender's background wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Receiver finished and the relay released the pin
    Unpinned,
    /// Receiver finished but unpin failed; relay GC is the fallback
    CleanupFailed(String),
    /// No completion within the configured bound; nothing was unpinned
    Expired,
    /// The completion key could not be watched
    ListenerFailed(String),
    /// The session was cancelled or dropped before it finished
    Cancelled,
}

/// Handle on a sent transfer.
///
/// Owns the background task that waits for the receiver's completion
/// signal. Dropping the session (or calling [`cancel`](Self::cancel))
/// removes the listener.
#[derive(Debug)]
pub struct SendSession {
    code: TransferCode,
    descriptor: TransferDescriptor,
    task: JoinHandle<CompletionOutcome>,
}

impl SendSession {
    /// Code to hand to the receiver.
    pub fn code(&self) -> &TransferCode {
        &self.code
    }

    /// Descriptor that was published under the code.
    pub fn descriptor(&self) -> &TransferDescriptor {
        &self.descriptor
    }

    /// Whether the background wait has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the completion handshake and cleanup to finish.
    pub async fn wait(mut self) -> CompletionOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => CompletionOutcome::Cancelled,
            Err(e) => CompletionOutcome::ListenerFailed(e.to_string()),
        }
    }

    /// Stop waiting for completion. No unpin is attempted.
    pub fn cancel(self) {
        debug!(code = %self.code, "Send session cancelled");
        self.task.abort();
    }
}

impl Drop for SendSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sender and receiver sides of the wormhole protocol.
///
/// Cheap to clone; clones share the store, the relay client and the
/// observer.
#[derive(Debug, Clone)]
pub struct WormholeCore {
    channel: MetadataChannel,
    relay: RelayClient,
    config: WormholeConfig,
    events: EventSink,
}

impl WormholeCore {
    /// Create a coordinator reporting to `events`.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        config: WormholeConfig,
        events: EventSink,
    ) -> WormholeResult<Self> {
        let relay = RelayClient::new(&config.relay_url, config.auth_token.clone())
            .map_err(|e| WormholeError::Config(e.to_string()))?;

        Ok(Self {
            channel: MetadataChannel::new(store),
            relay,
            config,
            events,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &WormholeConfig {
        &self.config
    }

    /// Metadata channel in use.
    pub fn channel(&self) -> &MetadataChannel {
        &self.channel
    }

    fn emit(&self, code: &TransferCode, status: TransferStatus, message: impl Into<String>) {
        self.events.emit(StatusEvent::new(code, status, message));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Send
    // ═══════════════════════════════════════════════════════════════════════

    /// Upload a file and publish it under a fresh code.
    ///
    /// Returns as soon as the descriptor is published. The returned session
    /// keeps listening for the receiver and unpins the content once it has
    /// been fetched.
    ///
    /// # Errors
    ///
    /// `WormholeError::Upload` if the relay rejects the upload or returns
    /// no content hash. Nothing is published in that case.
    pub async fn send(
        &self,
        data: impl Into<Bytes>,
        filename: &str,
        mime_type: &str,
    ) -> WormholeResult<SendSession> {
        let data = data.into();
        let size = data.len() as u64;
        let code = TransferCode::generate();

        info!(code = %code, filename, size, "Starting send");
        self.emit(
            &code,
            TransferStatus::Uploading,
            format!("Uploading {} ({} bytes)", filename, size),
        );

        let hash = match self.relay.upload(data, filename, mime_type).await {
            Ok(hash) => hash,
            Err(e) => {
                let err = WormholeError::Upload(e);
                warn!(code = %code, error = %err, "Upload failed");
                self.emit(&code, TransferStatus::Error, format!("{} (code {})", err, code));
                return Err(err);
            }
        };

        self.emit(&code, TransferStatus::Pinning, "Publishing transfer metadata");
        let descriptor = TransferDescriptor::new(filename, size, mime_type, hash.clone());
        self.publish(&code, &descriptor).await;

        let subscription = self.channel.watch_completion(&code).await;

        self.emit(
            &code,
            TransferStatus::Sent,
            format!("Ready to receive with code {}", code),
        );

        let task = tokio::spawn(self.clone().await_completion(
            code.clone(),
            hash,
            descriptor.created_at,
            subscription,
        ));

        Ok(SendSession {
            code,
            descriptor,
            task,
        })
    }

    /// Publish failures are logged, not returned.
    async fn publish(&self, code: &TransferCode, descriptor: &TransferDescriptor) {
        if let Ok(true) = self.channel.descriptor_exists(code).await {
            warn!(code = %code, "Code already in use, overwriting previous descriptor");
        }

        if let Err(e) = self.channel.publish_descriptor(code, descriptor).await {
            warn!(code = %code, error = %e, "Failed to publish descriptor");
        }
    }

    async fn await_completion(
        self,
        code: TransferCode,
        hash: String,
        not_before: i64,
        subscription: Result<Subscription, StoreError>,
    ) -> CompletionOutcome {
        let mut subscription = match subscription {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(code = %code, error = %e, "Cannot watch for completion");
                self.emit(
                    &code,
                    TransferStatus::CleanupFailed,
                    format!(
                        "Could not watch for completion ({}); the relay's garbage collection will reclaim {}",
                        e, hash
                    ),
                );
                return CompletionOutcome::ListenerFailed(e.to_string());
            }
        };

        let completed = match self.config.completion_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, next_completion(&mut subscription, not_before))
                    .await
                {
                    Ok(completed) => completed,
                    Err(_) => {
                        subscription.cancel();
                        info!(code = %code, ?limit, "Stopped waiting for completion");
                        self.emit(
                            &code,
                            TransferStatus::Expired,
                            format!(
                                "No receiver within {:?}; the relay's garbage collection will reclaim {}",
                                limit, hash
                            ),
                        );
                        return CompletionOutcome::Expired;
                    }
                }
            }
            None => next_completion(&mut subscription, not_before).await,
        };

        // React at most once, whatever the store delivers afterwards
        subscription.cancel();

        if !completed {
            let reason = StoreError::Closed.to_string();
            self.emit(
                &code,
                TransferStatus::CleanupFailed,
                format!(
                    "Completion watch ended ({}); the relay's garbage collection will reclaim {}",
                    reason, hash
                ),
            );
            return CompletionOutcome::ListenerFailed(reason);
        }

        info!(code = %code, "Receiver finished");
        self.emit(&code, TransferStatus::Completed, "Transfer completed");
        self.emit(&code, TransferStatus::Unpinning, "Releasing relay storage");

        let reason = match self.relay.unpin(&hash).await {
            Ok(true) => {
                info!(code = %code, hash = %hash, "Unpinned");
                self.emit(&code, TransferStatus::Unpinned, "Relay storage released");
                return CompletionOutcome::Unpinned;
            }
            Ok(false) => "relay reported failure".to_string(),
            Err(source) => WormholeError::Cleanup {
                hash: hash.clone(),
                source,
            }
            .to_string(),
        };

        warn!(code = %code, hash = %hash, %reason, "Unpin failed");
        self.emit(
            &code,
            TransferStatus::CleanupFailed,
            format!(
                "Automatic cleanup failed ({}); the relay's garbage collection will reclaim {}",
                reason, hash
            ),
        );
        CompletionOutcome::CleanupFailed(reason)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Receive
    // ═══════════════════════════════════════════════════════════════════════

    /// Fetch the file published under `code`.
    ///
    /// Never fails: every outcome, including errors, is reported as an
    /// event. A failed receive is not retried.
    pub async fn receive(&self, code: &TransferCode) {
        if let Err(err) = self.try_receive(code).await {
            warn!(code = %code, error = %err, "Receive failed");
            let message = match &err {
                WormholeError::DescriptorTimeout { .. }
                | WormholeError::InvalidCode(_)
                | WormholeError::Download { .. } => err.to_string(),
                other => format!("Receive failed for code '{}': {}", code, other),
            };
            self.emit(code, TransferStatus::Error, message);
        }
    }

    /// Run [`receive`](Self::receive) on its own task.
    pub fn spawn_receive(&self, code: TransferCode) -> JoinHandle<()> {
        let core = self.clone();
        tokio::spawn(async move { core.receive(&code).await })
    }

    async fn try_receive(&self, code: &TransferCode) -> WormholeResult<()> {
        self.emit(
            code,
            TransferStatus::Connecting,
            format!("Looking up transfer {}", code),
        );

        let timeout = self.config.receive_timeout;
        let value = self
            .channel
            .fetch_descriptor(code, timeout)
            .await?
            .ok_or_else(|| WormholeError::DescriptorTimeout {
                code: code.to_string(),
                timeout,
            })?;

        let descriptor = serde_json::from_value::<TransferDescriptor>(value)
            .ok()
            .filter(TransferDescriptor::has_content_hash)
            .ok_or_else(|| WormholeError::InvalidCode(code.to_string()))?;

        info!(code = %code, filename = %descriptor.filename, size = descriptor.size, "Found transfer");
        self.events.emit(
            StatusEvent::new(
                code,
                TransferStatus::Downloading,
                format!("Downloading {} ({} bytes)", descriptor.filename, descriptor.size),
            )
            .with_metadata(descriptor.clone()),
        );

        let bytes = self
            .relay
            .download(&descriptor.content_hash, |loaded, total| {
                if let Some(total) = total {
                    let progress = Progress::new(loaded, total);
                    self.events.emit(
                        StatusEvent::new(
                            code,
                            TransferStatus::Progress,
                            format!("{}%", progress.progress),
                        )
                        .with_progress(progress),
                    );
                }
            })
            .await
            .map_err(|source| WormholeError::Download {
                code: code.to_string(),
                source,
            })?;

        let file_data = FileData {
            bytes,
            filename: descriptor.filename.clone(),
            mime_type: descriptor.mime_type.clone(),
        };
        self.events.emit(
            StatusEvent::new(
                code,
                TransferStatus::Downloaded,
                format!("Received {}", descriptor.filename),
            )
            .with_metadata(descriptor)
            .with_file_data(file_data),
        );

        // Fire-and-forget: the sender's relay GC covers a lost signal
        if let Err(e) = self.channel.signal_completion(code).await {
            warn!(code = %code, error = %e, "Failed to write completion signal");
        }

        Ok(())
    }
}

/// Wait for the first completion signal written at or after `not_before`.
/// `false` if the store went away.
///
/// A reused code can still carry the completion record of an earlier
/// transfer; that record predates our descriptor and is skipped.
async fn next_completion(subscription: &mut Subscription, not_before: i64) -> bool {
    while let Some(value) = subscription.next().await {
        match serde_json::from_value::<CompletionSignal>(value) {
            Ok(signal) if signal.is_completed() && signal.timestamp < not_before => debug!(
                timestamp = signal.timestamp,
                not_before, "Ignoring completion signal from an earlier transfer"
            ),
            Ok(signal) if signal.is_completed() => return true,
            Ok(signal) => debug!(status = %signal.status, "Ignoring non-completion signal"),
            Err(e) => debug!(error = %e, "Ignoring malformed completion record"),
        }
    }
    false
}
