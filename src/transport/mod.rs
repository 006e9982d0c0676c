//! Duplex transport layer.
//!
//! The connection state machine depends on a message-oriented duplex
//! transport with automatic reconnection, expressed as the [`Transport`]
//! trait. Inbound traffic flows back through a [`TransportHandler`]
//! installed by the owner.
//!
//! # Contract
//!
//! | Capability | Method |
//! |------------|--------|
//! | Establish the connection | [`Transport::connect`] |
//! | Force a reconnect cycle | [`Transport::reconnect`] |
//! | Tear down for good | [`Transport::force_disconnect`] |
//! | Liveness probe | [`Transport::is_connected`] |
//! | Send a JSON message | [`Transport::send_json`] |
//! | Inbound hooks | [`Transport::set_handler`] |
//!
//! The transport owns socket-level retry: the connection layer triggers
//! [`Transport::reconnect`] only on keepalive failure or an explicit
//! RECONNECT envelope and otherwise assumes the transport keeps itself
//! alive.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | Default tokio-tungstenite implementation |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// Default WebSocket transport implementation.
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// A duplex, message-oriented connection to a single remote endpoint.
///
/// Implementations must reconnect automatically (with backoff) after
/// transport-level failures and replay inbound hooks on every
/// (re)connect.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes the initial connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the endpoint cannot be reached.
    async fn connect(&self) -> Result<()>;

    /// Drops the current connection and establishes a new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the transport was never
    /// started or has been force-disconnected.
    async fn reconnect(&self) -> Result<()>;

    /// Tears the connection down without triggering auto-reconnect.
    async fn force_disconnect(&self);

    /// Returns `true` while a live connection exists.
    fn is_connected(&self) -> bool;

    /// Serializes and transmits a JSON message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if no live connection exists.
    async fn send_json(&self, message: Value) -> Result<()>;

    /// Installs the inbound hook set, replacing any previous handler.
    fn set_handler(&self, handler: Arc<dyn TransportHandler>);
}

// ============================================================================
// TransportHandler
// ============================================================================

/// Inbound hooks invoked by a [`Transport`].
///
/// All methods default to no-ops so owners only implement what they
/// need.
pub trait TransportHandler: Send + Sync {
    /// Called after every successful connect or reconnect.
    fn on_connect(&self) {}

    /// Called with each inbound message frame.
    ///
    /// # Errors
    ///
    /// Returning an error reports the frame to the transport's own error
    /// channel (it is forwarded to [`TransportHandler::on_error`]).
    fn on_message(&self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Called with transport-level and dispatch errors.
    fn on_error(&self, _error: Error) {}
}
