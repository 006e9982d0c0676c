//! Topic subscription records.
//!
//! A [`Topic`] couples a subscription name with its correlation nonce,
//! the credential attached to listen requests, and the callback invoked
//! for delivered messages.
//!
//! Identity is `(name, credential)` hashed into a [`TopicIdentifier`],
//! independent of any nonce: removal matches by identity because an
//! UNLISTEN travels with a freshly generated nonce.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::identifiers::{Nonce, TopicIdentifier};
use crate::protocol::{MessageData, Request, TopicRequest};

// ============================================================================
// TopicCallback
// ============================================================================

/// Callback invoked with each message delivered to a topic.
///
/// Invocations are fire-and-forget on the tokio runtime: no result is
/// awaited, and there is no ordering guarantee relative to other topics.
pub type TopicCallback = Arc<dyn Fn(MessageData) + Send + Sync>;

// ============================================================================
// Topic
// ============================================================================

/// A named subscription plus its correlation and callback state.
///
/// Created by `listen`, destroyed by `unlisten` or by server-error
/// eviction. A topic is optimistically considered listening the moment it
/// is registered on a connection, before any server confirmation.
#[derive(Clone)]
pub struct Topic {
    /// Subscription key.
    name: String,

    /// Correlation token for the pending LISTEN request.
    nonce: Nonce,

    /// Auth token attached to listen requests.
    credential: String,

    /// Invoked with delivered message data.
    callback: TopicCallback,
}

impl Topic {
    /// Creates a topic with a freshly generated nonce.
    pub(crate) fn new(
        name: impl Into<String>,
        credential: impl Into<String>,
        callback: TopicCallback,
    ) -> Self {
        Self {
            name: name.into(),
            nonce: Nonce::generate(),
            credential: credential.into(),
            callback,
        }
    }

    /// Returns the topic name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pending-request correlation nonce.
    #[inline]
    #[must_use]
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Returns the stable identity of this topic.
    ///
    /// Derived from name and credential; never transmitted on the wire.
    #[inline]
    #[must_use]
    pub fn identifier(&self) -> TopicIdentifier {
        TopicIdentifier::new(&self.name, &self.credential)
    }

    /// Encodes the LISTEN envelope for this topic.
    pub(crate) fn listen_request(&self) -> Request {
        Request::Listen {
            nonce: self.nonce.clone(),
            data: TopicRequest {
                topics: vec![self.name.clone()],
                auth_token: Some(self.credential.clone()),
            },
        }
    }

    /// Encodes the UNLISTEN envelope for this topic.
    ///
    /// Carries a freshly generated nonce, not the LISTEN's nonce, and no
    /// auth token.
    pub(crate) fn unlisten_request(&self) -> Request {
        Request::Unlisten {
            nonce: Nonce::generate(),
            data: TopicRequest {
                topics: vec![self.name.clone()],
                auth_token: None,
            },
        }
    }

    /// Invokes the delivery callback.
    pub(crate) fn deliver(&self, data: MessageData) {
        (self.callback)(data);
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::NONCE_LENGTH;

    fn noop_callback() -> TopicCallback {
        Arc::new(|_| {})
    }

    #[test]
    fn test_listen_envelope_round_trip() {
        let topic = Topic::new("topicA", "T", noop_callback());
        let json = serde_json::to_string(&topic.listen_request()).expect("serialize");
        let decoded: Request = serde_json::from_str(&json).expect("parse");

        match decoded {
            Request::Listen { nonce, data } => {
                assert_eq!(nonce, *topic.nonce());
                assert_eq!(nonce.as_str().len(), NONCE_LENGTH * 2);
                assert_eq!(data.topics, vec!["topicA".to_string()]);
                assert_eq!(data.auth_token.as_deref(), Some("T"));
            }
            other => panic!("expected LISTEN, got {other:?}"),
        }
    }

    #[test]
    fn test_unlisten_envelope_fresh_nonce() {
        let topic = Topic::new("topicA", "T", noop_callback());
        let request = topic.unlisten_request();

        match request {
            Request::Unlisten { nonce, data } => {
                assert_ne!(nonce, *topic.nonce());
                assert_eq!(data.topics, vec!["topicA".to_string()]);
                assert!(data.auth_token.is_none());
            }
            other => panic!("expected UNLISTEN, got {other:?}"),
        }
    }

    #[test]
    fn test_identifier_independent_of_nonce() {
        let a = Topic::new("topicA", "T", noop_callback());
        let b = Topic::new("topicA", "T", noop_callback());

        assert_ne!(a.nonce(), b.nonce());
        assert_eq!(a.identifier(), b.identifier());
    }

    #[test]
    fn test_deliver_invokes_callback() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let topic = Topic::new(
            "topicA",
            "T",
            Arc::new(move |data: MessageData| {
                assert_eq!(data.topic, "topicA");
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        topic.deliver(MessageData {
            topic: "topicA".to_string(),
            message: "payload".to_string(),
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
