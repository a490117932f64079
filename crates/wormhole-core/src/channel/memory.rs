//! In-process metadata store
//!
//! Last-write-wins map with per-key subscriber lists. Used by tests and by
//! embedders that run sender and receiver in one process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use super::{MetadataStore, StoreResult, Subscription};

#[derive(Default)]
struct Slot {
    value: Option<Value>,
    subscribers: Vec<mpsc::UnboundedSender<Value>>,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a key.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.slots
            .lock()
            .get(key)
            .map(|slot| slot.subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// All keys that currently hold a value.
    pub fn keys(&self) -> Vec<String> {
        let slots = self.slots.lock();
        let mut keys: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn put(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.to_string()).or_default();
        slot.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        trace!(key, subscribers = slot.subscribers.len(), "put");
        slot.value = Some(value);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.slots.lock().get(key).and_then(|slot| slot.value.clone()))
    }

    async fn subscribe(&self, key: &str) -> StoreResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.to_string()).or_default();
        if let Some(value) = &slot.value {
            // Receiver is alive; this cannot fail
            let _ = tx.send(value.clone());
        }
        slot.subscribers.retain(|tx| !tx.is_closed());
        slot.subscribers.push(tx);
        Ok(Subscription::new(key, rx))
    }
}
