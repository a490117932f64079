//! Coordinator configuration

use std::time::Duration;

/// Relay used when nothing else is configured
pub const DEFAULT_RELAY_URL: &str = "http://localhost:3000";

/// How long `receive` waits for a descriptor by default
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for a [`WormholeCore`](crate::WormholeCore).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use wormhole_core::WormholeConfig;
///
/// let config = WormholeConfig::new("https://relay.example.com")
///     .with_auth_token("secret")
///     .with_receive_timeout(Duration::from_secs(5))
///     .with_completion_timeout(Duration::from_secs(3600));
/// assert_eq!(config.receive_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WormholeConfig {
    /// Base URL of the relay
    pub relay_url: String,
    /// Bearer token for upload and unpin
    pub auth_token: Option<String>,
    /// Bound on the receive-side descriptor lookup
    pub receive_timeout: Duration,
    /// Bound on the sender's wait for a completion signal (None = until
    /// the session is dropped)
    pub completion_timeout: Option<Duration>,
}

impl Default for WormholeConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            auth_token: None,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            completion_timeout: None,
        }
    }
}

impl WormholeConfig {
    /// Defaults with a specific relay.
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            ..Default::default()
        }
    }

    /// Set the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the descriptor lookup bound.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Bound the sender's completion wait.
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WormholeConfig::default();
        assert_eq!(config.relay_url, "http://localhost:3000");
        assert_eq!(config.receive_timeout, Duration::from_secs(10));
        assert!(config.auth_token.is_none());
        assert!(config.completion_timeout.is_none());
    }
}
