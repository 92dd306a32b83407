//! Core shared types for the Sottochat secure messaging system.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod config;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// PeerId
// ---------------------------------------------------------------------------

/// Cryptographic peer identity derived as SHA3-256(identity public key).
///
/// This is the primary identity of a peer on the overlay. The binding
/// between a `PeerId` and an Ed25519 identity public key is verified
/// by recomputing the hash; the overlay provides the public key for
/// every accepted stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// The fixed byte length of a peer id.
    pub const LEN: usize = 32;

    /// Creates a new `PeerId` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for PeerId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PeerId {
    type Err = SottochatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| SottochatError::Protocol {
            reason: "invalid hex encoding for peer id".into(),
        })?;
        if bytes.len() != 32 {
            return Err(SottochatError::Protocol {
                reason: format!("expected 32 bytes for peer id, got {}", bytes.len()),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Unique message identifier (UUID v4).
///
/// Generated fresh for every outgoing encrypted message. Globally
/// unique, which is what allows the replay cache to be a single
/// process-wide structure rather than per-session state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random message id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `MessageId` from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = SottochatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(|e| SottochatError::Protocol {
            reason: format!("invalid message id: {e}"),
        })?;
        Ok(Self(uuid))
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// UTC timestamp in ISO 8601 format.
///
/// All timestamps use UTC so freshness checks behave identically
/// across peers regardless of timezone. Handshake messages are
/// rejected when their timestamp falls outside the configured skew
/// window (default ±5 minutes).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` representing the current UTC time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns whole seconds since the Unix epoch.
    ///
    /// This is the value bound into handshake signature preimages.
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// Returns the elapsed wall-clock time since this timestamp.
    ///
    /// A timestamp in the future yields `Duration::ZERO`.
    pub fn elapsed(&self) -> std::time::Duration {
        (Utc::now() - self.0)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }

    /// Returns the signed skew between this timestamp and the local
    /// clock, in seconds. Positive means the timestamp lies in the
    /// past, negative means it claims to be from the future.
    pub fn skew_seconds(&self) -> i64 {
        (Utc::now() - self.0).num_seconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = SottochatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| SottochatError::Protocol {
                reason: format!("invalid ISO 8601 timestamp: {e}"),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }
}

// ---------------------------------------------------------------------------
// SottochatError
// ---------------------------------------------------------------------------

/// Central error type for the Sottochat system.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
///
/// Propagation policy:
///
/// - [`Crypto`](SottochatError::Crypto) and
///   [`Protocol`](SottochatError::Protocol) are local: they abort the
///   current stream and are never retried.
/// - [`Transport`](SottochatError::Transport) is transient: the sender
///   retries it with exponential backoff.
/// - [`Session`](SottochatError::Session) and
///   [`Cancelled`](SottochatError::Cancelled) are surfaced to the
///   caller.
#[derive(Debug, Error)]
pub enum SottochatError {
    /// A cryptographic primitive failed (malformed key, AEAD
    /// authentication failure, weak ECDH output).
    #[error("crypto error: {reason}")]
    Crypto {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// A protocol-level failure (decoding error, unexpected envelope
    /// type, sequence mismatch, stale timestamp, bad signature).
    #[error("protocol error: {reason}")]
    Protocol {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// A session-state failure (missing session, duplicate rekey,
    /// expired session).
    #[error("session error: {reason}")]
    Session {
        /// Human-readable description of the session-state failure.
        reason: String,
    },

    /// A transport failure (stream open, read, or write failure, or
    /// an acknowledgement timeout).
    #[error("transport error: {reason}")]
    Transport {
        /// Human-readable description of the transport failure.
        reason: String,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// A configuration value is invalid.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`SottochatError`].
pub type Result<T> = std::result::Result<T, SottochatError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
