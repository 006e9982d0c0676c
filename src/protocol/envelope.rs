//! Envelope message types.
//!
//! Defines the typed JSON envelopes for both directions of the PubSub
//! protocol. Envelopes are discriminated by their `type` field.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::Nonce;

// ============================================================================
// Request
// ============================================================================

/// An outbound envelope from client to server.
///
/// # Format
///
/// ```json
/// {
///   "type": "LISTEN",
///   "nonce": "32 hex chars",
///   "data": { "topics": ["topic-name"], "auth_token": "..." }
/// }
/// ```
///
/// `UNLISTEN` shares the shape but omits `auth_token`; `PING` carries the
/// type tag only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Subscribe to one or more topics.
    #[serde(rename = "LISTEN")]
    Listen {
        /// Correlation token echoed in the RESPONSE.
        nonce: Nonce,
        /// Topic list plus auth token.
        data: TopicRequest,
    },

    /// Unsubscribe from one or more topics.
    #[serde(rename = "UNLISTEN")]
    Unlisten {
        /// Correlation token echoed in the RESPONSE.
        nonce: Nonce,
        /// Topic list (no auth token).
        data: TopicRequest,
    },

    /// Keepalive probe.
    #[serde(rename = "PING")]
    Ping,
}

impl Request {
    /// Returns the correlation nonce, if this envelope carries one.
    #[inline]
    #[must_use]
    pub fn nonce(&self) -> Option<&Nonce> {
        match self {
            Self::Listen { nonce, .. } | Self::Unlisten { nonce, .. } => Some(nonce),
            Self::Ping => None,
        }
    }
}

// ============================================================================
// TopicRequest
// ============================================================================

/// The `data` payload of a LISTEN/UNLISTEN envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRequest {
    /// Topic names being subscribed or unsubscribed.
    pub topics: Vec<String>,

    /// Auth token, present on LISTEN only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

// ============================================================================
// ServerMessage
// ============================================================================

/// An inbound envelope from server to client.
///
/// # Format
///
/// ```json
/// { "type": "RESPONSE", "nonce": "...", "error": "" }
/// { "type": "MESSAGE", "data": { "topic": "...", "message": "..." } }
/// { "type": "PONG" }
/// { "type": "RECONNECT" }
/// ```
///
/// Unrecognized `type` values parse as [`ServerMessage::Unknown`] and are
/// ignored by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Result of a LISTEN/UNLISTEN request.
    ///
    /// An empty `error` string signals success.
    #[serde(rename = "RESPONSE")]
    Response {
        /// Nonce of the originating request.
        #[serde(default)]
        nonce: String,
        /// Wire error code, empty on success.
        #[serde(default)]
        error: String,
    },

    /// A push event for a subscribed topic.
    #[serde(rename = "MESSAGE")]
    Message {
        /// Topic name and opaque payload.
        data: MessageData,
    },

    /// Keepalive acknowledgement.
    #[serde(rename = "PONG")]
    Pong,

    /// Server-requested reconnect.
    #[serde(rename = "RECONNECT")]
    Reconnect,

    /// Any envelope type this client does not understand.
    #[serde(other)]
    Unknown,
}

// ============================================================================
// MessageData
// ============================================================================

/// The `data` payload of a MESSAGE envelope.
///
/// `message` is an opaque string; callers decode it per their own
/// topic-specific schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    /// Topic the event was published to.
    pub topic: String,

    /// Opaque event payload.
    pub message: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_serialization() {
        let request = Request::Listen {
            nonce: Nonce::from_string("abc123"),
            data: TopicRequest {
                topics: vec!["channel-points-channel-v1.1234".to_string()],
                auth_token: Some("oauth-token".to_string()),
            },
        };

        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["type"], "LISTEN");
        assert_eq!(json["nonce"], "abc123");
        assert_eq!(json["data"]["topics"][0], "channel-points-channel-v1.1234");
        assert_eq!(json["data"]["auth_token"], "oauth-token");
    }

    #[test]
    fn test_unlisten_omits_auth_token() {
        let request = Request::Unlisten {
            nonce: Nonce::from_string("abc123"),
            data: TopicRequest {
                topics: vec!["whispers.1234".to_string()],
                auth_token: None,
            },
        };

        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["type"], "UNLISTEN");
        assert!(json["data"].get("auth_token").is_none());
    }

    #[test]
    fn test_ping_shape() {
        let json = serde_json::to_string(&Request::Ping).expect("serialize");
        assert_eq!(json, r#"{"type":"PING"}"#);
    }

    #[test]
    fn test_parse_response() {
        let message: ServerMessage =
            serde_json::from_str(r#"{"type":"RESPONSE","nonce":"abc","error":""}"#)
                .expect("parse");

        match message {
            ServerMessage::Response { nonce, error } => {
                assert_eq!(nonce, "abc");
                assert!(error.is_empty());
            }
            other => panic!("expected RESPONSE, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_response_with_error() {
        let message: ServerMessage =
            serde_json::from_str(r#"{"type":"RESPONSE","nonce":"abc","error":"ERR_BADAUTH"}"#)
                .expect("parse");

        match message {
            ServerMessage::Response { error, .. } => assert_eq!(error, "ERR_BADAUTH"),
            other => panic!("expected RESPONSE, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_message() {
        let message: ServerMessage = serde_json::from_str(
            r#"{"type":"MESSAGE","data":{"topic":"whispers.1234","message":"{\"body\":\"hi\"}"}}"#,
        )
        .expect("parse");

        match message {
            ServerMessage::Message { data } => {
                assert_eq!(data.topic, "whispers.1234");
                // Payload stays opaque.
                assert_eq!(data.message, r#"{"body":"hi"}"#);
            }
            other => panic!("expected MESSAGE, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_pong_and_reconnect() {
        let pong: ServerMessage = serde_json::from_str(r#"{"type":"PONG"}"#).expect("parse");
        assert!(matches!(pong, ServerMessage::Pong));

        let reconnect: ServerMessage =
            serde_json::from_str(r#"{"type":"RECONNECT"}"#).expect("parse");
        assert!(matches!(reconnect, ServerMessage::Reconnect));
    }

    #[test]
    fn test_parse_unknown_type() {
        let message: ServerMessage =
            serde_json::from_str(r#"{"type":"AUDIT","data":{}}"#).expect("parse");
        assert!(matches!(message, ServerMessage::Unknown));
    }
}
