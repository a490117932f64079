//! Metadata channel: small JSON records keyed by transfer code
//!
//! The channel is a thin typed layer over a synchronized key-value store.
//! The store is external; all we need from it is captured by
//! [`MetadataStore`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  MetadataStore                                               │
//! │  ├── put(key, value)          write, last-write-wins         │
//! │  ├── get(key)                 point read                     │
//! │  ├── subscribe(key)           current value + later writes   │
//! │  │   └── Subscription         drop / cancel() unsubscribes   │
//! │  └── fetch(key, timeout)      one-shot, result-or-timeout    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys used by the coordinator:
//!
//! - `<code>`: the transfer descriptor (sender writes)
//! - `wormhole-index/<code>`: GC index record (sender writes)
//! - `<code>-received`: completion signal (receiver writes)

mod http;
mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::code::TransferCode;
use crate::error::StoreError;
use crate::types::{CompletionSignal, IndexRecord, TransferDescriptor};

/// Prefix of the GC index keys
pub const INDEX_PREFIX: &str = "wormhole-index";

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A live subscription to one key.
///
/// Yields the current value (if any) followed by every later write.
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    key: String,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    /// Wrap the receiving half handed out by a store backend.
    pub fn new(key: impl Into<String>, rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self {
            key: key.into(),
            rx,
        }
    }

    /// The key this subscription watches.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next value. `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Unsubscribe explicitly.
    pub fn cancel(mut self) {
        debug!(key = %self.key, "Cancelling subscription");
        self.rx.close();
    }
}

/// The synchronized key-value store behind the metadata channel.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Write a value. Readers may observe it with some delay.
    async fn put(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Read the current value, `None` if nothing was written.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Subscribe to a key until the returned handle is dropped.
    async fn subscribe(&self, key: &str) -> StoreResult<Subscription>;

    /// One-shot read that waits up to `timeout` for a value to appear.
    ///
    /// Returns `Ok(None)` on timeout. The underlying subscription is
    /// released either way, so later writes are not observed.
    async fn fetch(&self, key: &str, timeout: Duration) -> StoreResult<Option<Value>> {
        let mut subscription = self.subscribe(key).await?;
        match tokio::time::timeout(timeout, subscription.next()).await {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => Err(StoreError::Closed),
            Err(_) => Ok(None),
        }
    }
}

/// Typed access to transfer records.
#[derive(Clone)]
pub struct MetadataChannel {
    store: Arc<dyn MetadataStore>,
}

impl std::fmt::Debug for MetadataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataChannel").finish_non_exhaustive()
    }
}

impl MetadataChannel {
    /// Create a channel on top of any store backend.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Key of the GC index record for a code.
    pub fn index_key(code: &TransferCode) -> String {
        format!("{}/{}", INDEX_PREFIX, code)
    }

    /// Whether something is already stored under the code.
    pub async fn descriptor_exists(&self, code: &TransferCode) -> StoreResult<bool> {
        Ok(self.store.get(code.as_str()).await?.is_some())
    }

    /// Publish the descriptor and its index record.
    pub async fn publish_descriptor(
        &self,
        code: &TransferCode,
        descriptor: &TransferDescriptor,
    ) -> StoreResult<()> {
        let index = IndexRecord {
            created_at: descriptor.created_at,
        };
        self.store
            .put(code.as_str(), serde_json::to_value(descriptor)?)
            .await?;
        self.store
            .put(&Self::index_key(code), serde_json::to_value(index)?)
            .await?;
        debug!(code = %code, hash = %descriptor.content_hash, "Published descriptor");
        Ok(())
    }

    /// Wait up to `timeout` for whatever is stored under the code.
    ///
    /// The raw value is returned so callers can tell "nothing there" from
    /// "something there that is not a descriptor".
    pub async fn fetch_descriptor(
        &self,
        code: &TransferCode,
        timeout: Duration,
    ) -> StoreResult<Option<Value>> {
        self.store.fetch(code.as_str(), timeout).await
    }

    /// Subscribe to the completion key of a code.
    pub async fn watch_completion(&self, code: &TransferCode) -> StoreResult<Subscription> {
        self.store.subscribe(&code.completion_key()).await
    }

    /// Write the completion signal for a code.
    pub async fn signal_completion(&self, code: &TransferCode) -> StoreResult<()> {
        let signal = CompletionSignal::completed();
        self.store
            .put(&code.completion_key(), serde_json::to_value(signal)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (MetadataChannel, MemoryStore) {
        let store = MemoryStore::new();
        (MetadataChannel::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_publish_writes_descriptor_and_index() {
        let (channel, store) = channel();
        let code = TransferCode::parse("42-brave-fire").unwrap();
        let descriptor = TransferDescriptor::new("a.txt", 10, "text/plain", "Qm123");

        channel.publish_descriptor(&code, &descriptor).await.unwrap();

        let stored = store.get("42-brave-fire").await.unwrap().unwrap();
        let parsed: TransferDescriptor = serde_json::from_value(stored).unwrap();
        assert_eq!(parsed, descriptor);

        let index = store
            .get("wormhole-index/42-brave-fire")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index["createdAt"], descriptor.created_at);
        assert!(channel.descriptor_exists(&code).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_times_out_without_value() {
        let (channel, store) = channel();
        let code = TransferCode::parse("nothing-here").unwrap();

        let value = channel
            .fetch_descriptor(&code, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(value.is_none());
        assert_eq!(store.subscriber_count("nothing-here"), 0);
    }

    #[tokio::test]
    async fn test_fetch_sees_late_write() {
        let (channel, store) = channel();
        let code = TransferCode::parse("1-calm-moon").unwrap();

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer
                .put("1-calm-moon", serde_json::json!({"late": true}))
                .await
                .unwrap();
        });

        let value = channel
            .fetch_descriptor(&code, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(value, Some(serde_json::json!({"late": true})));
    }

    #[tokio::test]
    async fn test_completion_roundtrip_through_watch() {
        let (channel, _store) = channel();
        let code = TransferCode::parse("3-swift-otter").unwrap();

        let mut watch = channel.watch_completion(&code).await.unwrap();
        channel.signal_completion(&code).await.unwrap();

        let value = watch.next().await.unwrap();
        let signal: CompletionSignal = serde_json::from_value(value).unwrap();
        assert!(signal.is_completed());
    }
}
