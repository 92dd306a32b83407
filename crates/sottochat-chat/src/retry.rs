//! Retry policy and error classification for outbound delivery.
//!
//! Transport failures and acknowledgement timeouts are transient and
//! retried with exponential backoff. Crypto, protocol, and
//! session-state failures are permanent: retrying a bad signature or
//! a stale sequence number cannot succeed, so those surface
//! immediately. Cancellation always aborts the ladder.

use std::time::Duration;

use sottochat_types::config::SecureChatConfig;
use sottochat_types::SottochatError;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Exponential backoff schedule for transient failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Factor applied to the delay after each retry.
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Builds the policy from the configured retry budget and base
    /// delay, doubling between attempts.
    pub fn from_config(config: &SecureChatConfig) -> Self {
        Self {
            max_attempts: config.retry_budget,
            base_delay: config.retry_base_delay,
            multiplier: 2,
        }
    }

    /// Returns the backoff delay after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(self.multiplier.saturating_pow(attempt))
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Whether an error is worth another delivery attempt.
///
/// Only transport failures (stream open/read/write errors and
/// acknowledgement timeouts) are transient.
pub fn is_retryable(error: &SottochatError) -> bool {
    matches!(error, SottochatError::Transport { .. })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
