//! Secure messaging configuration with sensible defaults.
//!
//! All operational parameters of the session core are centralized
//! here. Every value has a documented default; the freshness check on
//! handshakes is configurable but can never be disabled.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, SottochatError};

/// Configuration for the secure session core.
///
/// Defaults:
///
/// | parameter | default |
/// |---|---|
/// | `rekey_after_messages` | 1000 |
/// | `rekey_after_duration` | 30 min |
/// | `session_lifetime` | 60 min |
/// | `handshake_timestamp_window` | 5 min |
/// | `handshake_timeout` | 10 s |
/// | `ack_timeout` | 5 s |
/// | `retry_budget` | 3 |
/// | `retry_base_delay` | 500 ms |
/// | `rekey_grace` | 5 min |
/// | `sweep_interval` | 10 min |
/// | `replay_cache_capacity` | 1024 |
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecureChatConfig {
    /// Number of messages after which a session is rekeyed.
    pub rekey_after_messages: u64,

    /// Session age after which the next send triggers a rekey.
    pub rekey_after_duration: Duration,

    /// Maximum session age. Older sessions are expired and evicted.
    pub session_lifetime: Duration,

    /// Maximum clock skew accepted on a handshake timestamp, in
    /// either direction.
    pub handshake_timestamp_window: Duration,

    /// How long to wait for the counterpart's handshake or rekey
    /// response on a stream.
    pub handshake_timeout: Duration,

    /// How long to wait for an acknowledgement after sending an
    /// encrypted message.
    pub ack_timeout: Duration,

    /// Maximum number of delivery attempts per send.
    pub retry_budget: u32,

    /// Base delay of the exponential backoff between attempts.
    pub retry_base_delay: Duration,

    /// How long a pending rekey may remain unanswered before the
    /// sweeper resets it (keeping the session on its old key).
    pub rekey_grace: Duration,

    /// Interval between sweeper runs.
    pub sweep_interval: Duration,

    /// Capacity of the message-id replay cache.
    pub replay_cache_capacity: usize,
}

impl Default for SecureChatConfig {
    fn default() -> Self {
        Self {
            rekey_after_messages: 1000,
            rekey_after_duration: Duration::from_secs(30 * 60),
            session_lifetime: Duration::from_secs(60 * 60),
            handshake_timestamp_window: Duration::from_secs(5 * 60),
            handshake_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(5),
            retry_budget: 3,
            retry_base_delay: Duration::from_millis(500),
            rekey_grace: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            replay_cache_capacity: 1024,
        }
    }
}

impl SecureChatConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.rekey_after_messages == 0 {
            return Err(SottochatError::Config {
                reason: "rekey_after_messages must be greater than 0".into(),
            });
        }

        if self.rekey_after_duration.is_zero() {
            return Err(SottochatError::Config {
                reason: "rekey_after_duration must be greater than 0".into(),
            });
        }

        if self.session_lifetime <= self.rekey_after_duration {
            return Err(SottochatError::Config {
                reason: "session_lifetime must exceed rekey_after_duration".into(),
            });
        }

        if self.handshake_timestamp_window.is_zero() {
            return Err(SottochatError::Config {
                reason: "handshake_timestamp_window must be greater than 0".into(),
            });
        }

        if self.handshake_timeout.is_zero() {
            return Err(SottochatError::Config {
                reason: "handshake_timeout must be greater than 0".into(),
            });
        }

        if self.ack_timeout.is_zero() {
            return Err(SottochatError::Config {
                reason: "ack_timeout must be greater than 0".into(),
            });
        }

        if self.retry_budget == 0 {
            return Err(SottochatError::Config {
                reason: "retry_budget must be greater than 0".into(),
            });
        }

        if self.rekey_grace.is_zero() {
            return Err(SottochatError::Config {
                reason: "rekey_grace must be greater than 0".into(),
            });
        }

        if self.sweep_interval.is_zero() {
            return Err(SottochatError::Config {
                reason: "sweep_interval must be greater than 0".into(),
            });
        }

        if self.replay_cache_capacity == 0 {
            return Err(SottochatError::Config {
                reason: "replay_cache_capacity must be greater than 0".into(),
            });
        }

        Ok(())
    }
}
