//! Twitch PubSub - Pooled push-messaging subscription client.
//!
//! This library provides a high-level API for subscribing to Twitch
//! PubSub topics over WebSocket, spreading subscriptions across as many
//! connections as the per-connection topic ceiling requires.
//!
//! # Architecture
//!
//! The client is layered:
//!
//! - **[`Pool`]**: One subscription surface over an elastic connection set
//! - **[`Connection`]**: Per-connection protocol state machine (LISTEN /
//!   UNLISTEN, keepalive, replay on reconnect)
//! - **[`Transport`]**: Duplex message channel with automatic reconnection
//!
//! Key design principles:
//!
//! - Connections are created lazily, only when every existing one is at
//!   its 50-topic ceiling
//! - Subscriptions are registered optimistically; a server error RESPONSE
//!   evicts the topic and surfaces through the pool observer
//! - Every reconnect replays the connection's topics automatically
//! - Event-driven delivery: each topic carries its own callback
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_tungstenite::tungstenite::http::HeaderMap;
//! use twitch_pubsub::{Pool, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pool = Pool::new("oauth-token", HeaderMap::new());
//!     pool.start().await?;
//!
//!     pool.listen(
//!         "channel-points-channel-v1.44322889",
//!         Arc::new(|data| {
//!             println!("event on {}: {}", data.topic, data.message);
//!         }),
//!     )
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | Per-connection protocol state machine |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Nonces and topic identity hashes |
//! | [`pool`] | Connection pool and [`PoolObserver`] |
//! | [`protocol`] | Wire envelope types (internal) |
//! | [`topic`] | Topic handles and callbacks |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Per-connection protocol state machine.
///
/// A [`Connection`] multiplexes up to [`connection::MAX_TOPICS`] topics
/// over one transport and owns the keepalive loop.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Nonces and topic identity hashes.
///
/// Newtype wrappers for request correlation and credential-scoped topic
/// identity.
pub mod identifiers;

/// Connection pool.
///
/// Use [`Pool::new`] for the Twitch PubSub edge or
/// [`Pool::with_transport_factory`] for custom endpoints and tests.
pub mod pool;

/// Wire envelope types.
///
/// Internal module defining the LISTEN/UNLISTEN/PING request envelopes
/// and the server's RESPONSE/MESSAGE/PONG/RECONNECT messages.
pub mod protocol;

/// Topic handles and callbacks.
pub mod topic;

/// Duplex transport layer.
///
/// The [`Transport`] trait plus the default tokio-tungstenite
/// implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Pool types
pub use pool::{PUBSUB_EDGE_URL, Pool, PoolObserver, TransportFactory};

// Connection types
pub use connection::{Connection, MAX_TOPICS};

// Topic types
pub use topic::{Topic, TopicCallback};

// Error types
pub use error::{Error, Result, ServerError};

// Identifier types
pub use identifiers::{Nonce, TopicIdentifier};

// Protocol types
pub use protocol::MessageData;

// Transport types
pub use transport::{Transport, TransportHandler, WebSocketTransport};
