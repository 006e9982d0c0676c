//! Type-safe identifiers for subscription entities.
//!
//! Two newtypes cover the protocol's correlation and identity needs:
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Nonce`] | Random per-request token correlating LISTEN/UNLISTEN with RESPONSE |
//! | [`TopicIdentifier`] | Stable hash of topic name + credential, used for equality/removal |
//!
//! A [`Nonce`] travels on the wire; a [`TopicIdentifier`] never does. The
//! identifier is independent of any nonce on purpose: an UNLISTEN carries a
//! freshly generated nonce, so removal must match by identity rather than by
//! the original LISTEN's nonce.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Constants
// ============================================================================

/// Nonce length in bytes (hex-encoded to twice this many characters).
pub const NONCE_LENGTH: usize = 16;

// ============================================================================
// Nonce
// ============================================================================

/// A random request correlation token.
///
/// 128 bits of randomness, hex-encoded. Meaningful only while a
/// LISTEN/UNLISTEN request is outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generates a fresh random nonce.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);

        let mut encoded = String::with_capacity(NONCE_LENGTH * 2);
        for byte in bytes {
            encoded.push_str(&format!("{byte:02x}"));
        }
        Self(encoded)
    }

    /// Wraps an existing nonce string.
    ///
    /// Used when matching inbound RESPONSE envelopes against pending
    /// requests.
    #[inline]
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the hex-encoded nonce.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// TopicIdentifier
// ============================================================================

/// Stable identity of a topic, derived from its name and credential.
///
/// SHA-256 of `"{name}:{credential}"`, hex-encoded. Used purely for
/// equality and removal; never transmitted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicIdentifier(String);

impl TopicIdentifier {
    /// Computes the identifier for a name/credential pair.
    #[must_use]
    pub fn new(name: &str, credential: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(credential.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Returns the hex-encoded digest.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
