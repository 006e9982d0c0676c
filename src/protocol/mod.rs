//! PubSub wire protocol message types.
//!
//! This module defines the JSON envelopes exchanged with the PubSub edge
//! over the persistent WebSocket connection.
//!
//! # Protocol Overview
//!
//! | Envelope | Direction | Purpose |
//! |----------|-----------|---------|
//! | `LISTEN` / `UNLISTEN` | Client → Server | Subscribe / unsubscribe topics |
//! | `PING` | Client → Server | Keepalive probe |
//! | `RESPONSE` | Server → Client | Result of a LISTEN/UNLISTEN, matched by nonce |
//! | `MESSAGE` | Server → Client | Push event for a subscribed topic |
//! | `PONG` | Server → Client | Keepalive acknowledgement |
//! | `RECONNECT` | Server → Client | Server-requested reconnect |
//!
//! The `message` payload inside a MESSAGE envelope is an opaque string;
//! this crate never interprets it.

// ============================================================================
// Submodules
// ============================================================================

/// Envelope definitions for both directions.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{MessageData, Request, ServerMessage, TopicRequest};
