//! Wormhole Core Library
//!
//! One-shot file transfer between two machines that share nothing but a
//! short code.
//!
//! ## Overview
//!
//! The sender uploads a file to a content-addressed relay, publishes a small
//! descriptor under a code like `42-brave-fire`, and reads the code to the
//! receiver. The receiver looks the code up, streams the bytes from the
//! relay and writes a completion signal back. When the sender sees that
//! signal it asks the relay to drop the content.
//!
//! - **Relay**: holds the bytes ([`RelayClient`])
//! - **Metadata channel**: holds descriptors and completion signals
//!   ([`MetadataStore`], [`MetadataChannel`])
//! - **Coordinator**: runs both sides and reports [`StatusEvent`]s
//!   ([`WormholeCore`])
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use wormhole_core::{EventSink, MemoryStore, WormholeConfig, WormholeCore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (events, mut rx) = EventSink::channel();
//!     let core = WormholeCore::new(
//!         Arc::new(MemoryStore::new()),
//!         WormholeConfig::new("http://localhost:3000"),
//!         events,
//!     )?;
//!
//!     let session = core.send(b"hello".to_vec(), "hello.txt", "text/plain").await?;
//!     println!("Code: {}", session.code());
//!
//!     core.receive(session.code()).await;
//!     while let Ok(event) = rx.try_recv() {
//!         println!("{}: {}", event.status, event.message);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod chunk;
pub mod code;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod relay;
pub mod types;
pub mod wormhole;

// Re-exports
pub use channel::{
    HttpStore, MemoryStore, MetadataChannel, MetadataStore, StoreResult, Subscription,
    INDEX_PREFIX,
};
pub use code::TransferCode;
pub use config::{WormholeConfig, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_RELAY_URL};
pub use error::{RelayError, StoreError, WormholeError, WormholeResult};
pub use events::{EventSink, FileData, Progress, StatusEvent, TransferStatus};
pub use history::{Direction, TransferHistory, TransferRecord};
pub use relay::RelayClient;
pub use types::*;
pub use wormhole::{CompletionOutcome, SendSession, WormholeCore};
