//! Metadata store reached over HTTP
//!
//! Talks to a JSON key-value service:
//!
//! - `PUT {base}/{key}` with a JSON body stores a value
//! - `GET {base}/{key}` returns the value, or 404 if nothing is stored
//!
//! The service has no push channel, so subscriptions poll.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{MetadataStore, StoreResult, Subscription};
use crate::error::StoreError;

/// Default delay between subscription polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default bound on a single PUT or GET
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-backed metadata store.
#[derive(Debug, Clone)]
pub struct HttpStore {
    base: Url,
    client: Client,
    poll_interval: Duration,
    request_timeout: Duration,
}

impl HttpStore {
    /// Create a client for the store at `base_url`.
    pub fn new(base_url: &str) -> StoreResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            base,
            client: Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Change how often subscriptions poll.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Change the bound on each request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The store's base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn key_url(&self, key: &str) -> StoreResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl MetadataStore for HttpStore {
    async fn put(&self, key: &str, value: Value) -> StoreResult<()> {
        let url = self.key_url(key)?;
        let response = self
            .client
            .put(url)
            .timeout(self.request_timeout)
            .json(&value)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        trace!(key, "put");
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let url = self.key_url(key)?;
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let value: Value = response.json().await?;
                Ok(if value.is_null() { None } else { Some(value) })
            }
            status => Err(StoreError::Status(status.as_u16())),
        }
    }

    async fn subscribe(&self, key: &str) -> StoreResult<Subscription> {
        // Surface a bad key before spawning anything
        self.key_url(key)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let watched = key.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Value> = None;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = interval.tick() => {
                        match store.get(&watched).await {
                            Ok(Some(value)) if last.as_ref() != Some(&value) => {
                                if tx.send(value.clone()).is_err() {
                                    break;
                                }
                                last = Some(value);
                            }
                            Ok(_) => {}
                            Err(e) => debug!(key = %watched, error = %e, "Poll failed, retrying"),
                        }
                    }
                }
            }

            trace!(key = %watched, "Subscription poller stopped");
        });

        Ok(Subscription::new(key, rx))
    }
}
