//! Error types for the Twitch PubSub client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use twitch_pubsub::{Pool, Result};
//!
//! async fn example(pool: &std::sync::Arc<Pool>) -> Result<()> {
//!     pool.listen("channel-points-channel-v1.44322889", callback).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Subscription | [`Error::TooManyTopics`], [`Error::DuplicateTopic`], [`Error::InvalidTopic`] |
//! | Keepalive | [`Error::PingTimeout`] |
//! | Server-reported | [`Error::Subscription`] (see [`ServerError`]) |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
/// Server-reported errors additionally carry the evicted [`Topic`] as
/// context through the pool observer (see [`PoolObserver::on_error`]).
///
/// [`Topic`]: crate::Topic
/// [`PoolObserver::on_error`]: crate::PoolObserver::on_error
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Subscription Errors
    // ========================================================================
    /// Topic capacity exhausted on a single connection.
    ///
    /// Returned when a connection already tracks the maximum number of
    /// topics. Pool-level `listen` never fails with this variant because
    /// the pool creates a fresh connection instead.
    #[error("too many topics: connection limit of {limit} reached")]
    TooManyTopics {
        /// The per-connection topic ceiling.
        limit: usize,
    },

    /// Topic name already tracked.
    ///
    /// Checked at both connection and pool scope.
    #[error("duplicate topic: {topic}")]
    DuplicateTopic {
        /// The colliding topic name.
        topic: String,
    },

    /// Operation on, or server reference to, an unknown topic.
    ///
    /// Returned by `unlisten` for untracked names and raised internally
    /// when the server references a nonce or topic name that is not
    /// registered.
    #[error("topic not found: {reference}")]
    InvalidTopic {
        /// The unknown topic name or nonce.
        reference: String,
    },

    // ========================================================================
    // Keepalive Errors
    // ========================================================================
    /// PONG not received within the deadline.
    ///
    /// Reported through the error hook; the connection requests a
    /// transport reconnect on its own.
    #[error("PING timed out after {timeout_ms}ms")]
    PingTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Server-Reported Errors
    // ========================================================================
    /// The server rejected a subscription request.
    ///
    /// The offending topic is evicted and delivered as hook context.
    #[error("pubsub {kind}: topic {topic}")]
    Subscription {
        /// The server-reported error kind.
        kind: ServerError,
        /// Name of the evicted topic.
        topic: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport connection closed or never established.
    #[error("connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a capacity-exhausted error.
    #[inline]
    #[must_use]
    pub fn too_many_topics(limit: usize) -> Self {
        Self::TooManyTopics { limit }
    }

    /// Creates a duplicate topic error.
    #[inline]
    pub fn duplicate_topic(topic: impl Into<String>) -> Self {
        Self::DuplicateTopic {
            topic: topic.into(),
        }
    }

    /// Creates an invalid topic error.
    #[inline]
    pub fn invalid_topic(reference: impl Into<String>) -> Self {
        Self::InvalidTopic {
            reference: reference.into(),
        }
    }

    /// Creates a ping timeout error.
    #[inline]
    #[must_use]
    pub fn ping_timeout(timeout_ms: u64) -> Self {
        Self::PingTimeout { timeout_ms }
    }

    /// Creates a server-reported subscription error.
    #[inline]
    pub fn subscription(kind: ServerError, topic: impl Into<String>) -> Self {
        Self::Subscription {
            kind,
            topic: topic.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a server-reported subscription error.
    #[inline]
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Subscription { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors are handled by the connection's own reconnect
    /// and resubscribe cycle; no caller action is required.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PingTimeout { .. }) || self.is_connection_error()
    }
}

// ============================================================================
// ServerError
// ============================================================================

/// Error kinds reported by the PubSub server in a RESPONSE envelope.
///
/// Wire codes: `ERR_BADMESSAGE`, `ERR_BADAUTH`, `ERR_SERVER`,
/// `ERR_BADTOPIC`. An authorization failure (`BadAuth`) is surfaced but
/// not retried; escalation is the caller's policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerError {
    /// The request envelope was malformed (`ERR_BADMESSAGE`).
    BadMessage,
    /// The auth token was rejected (`ERR_BADAUTH`).
    BadAuth,
    /// Internal server error (`ERR_SERVER`).
    Server,
    /// The topic name was rejected (`ERR_BADTOPIC`).
    BadTopic,
}

impl ServerError {
    /// Parses a wire error code into a kind.
    ///
    /// Returns `None` for codes this client does not recognize.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ERR_BADMESSAGE" => Some(Self::BadMessage),
            "ERR_BADAUTH" => Some(Self::BadAuth),
            "ERR_SERVER" => Some(Self::Server),
            "ERR_BADTOPIC" => Some(Self::BadTopic),
            _ => None,
        }
    }

    /// Returns the wire error code for this kind.
    #[inline]
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadMessage => "ERR_BADMESSAGE",
            Self::BadAuth => "ERR_BADAUTH",
            Self::Server => "ERR_SERVER",
            Self::BadTopic => "ERR_BADTOPIC",
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Tests
// ============================================================================
