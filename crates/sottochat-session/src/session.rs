//! Per-peer session record and its state transitions.
//!
//! A session moves through four states:
//!
//! ```text
//! Fresh ──complete──▶ Established ──begin/accept rekey──▶ Rekeying
//!                          ▲                                  │
//!                          └──apply/finalize, or grace reset──┘
//!
//! any state ──older than the session lifetime──▶ Expired (evicted)
//! ```
//!
//! All mutable fields live behind one internal `RwLock`; state
//! transitions are serialized per session by that lock, and no lock
//! is ever held across I/O. Readers take a short-lived snapshot of
//! the shared key and drop the lock before using it.

use std::sync::RwLock;
use std::time::Duration;

use sottochat_crypto::ecdh::{EphemeralKeypair, SharedKey};
use sottochat_types::{PeerId, Result, SottochatError, Timestamp};

// ---------------------------------------------------------------------------
// RekeyRole
// ---------------------------------------------------------------------------

/// Which side of a pending rekey this peer is on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RekeyRole {
    /// We sent the rekey request and are waiting for the response.
    Initiator,
    /// We answered a rekey request and hold the precomputed key until
    /// the response is on the wire.
    Responder,
}

// ---------------------------------------------------------------------------
// PendingRekey
// ---------------------------------------------------------------------------

/// State held while a rekey is in flight.
struct PendingRekey {
    /// The new ephemeral keypair for this rekey.
    ephemeral: EphemeralKeypair,
    /// The new shared key, already computed on the responder side.
    shared_key: Option<SharedKey>,
    /// Sequence number being negotiated.
    sequence: u64,
    /// When the rekey started; stuck rekeys are reset after the
    /// grace period.
    initiated_at: Timestamp,
    /// Our role in this rekey.
    role: RekeyRole,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Mutable state of one session, guarded by the session lock.
struct SessionState {
    shared_key: Option<SharedKey>,
    ephemeral: EphemeralKeypair,
    created_at: Timestamp,
    last_used_at: Timestamp,
    message_count: u64,
    rekey_sequence: u64,
    is_rekeying: bool,
    pending_rekey: Option<PendingRekey>,
}

impl SessionState {
    /// Swaps in the negotiated key material. Resets the message
    /// counter; the rekey state is cleared by the caller taking
    /// `pending` out of the option.
    fn apply_pending(&mut self, pending: PendingRekey, shared: SharedKey) {
        self.shared_key = Some(shared);
        self.ephemeral = pending.ephemeral;
        self.rekey_sequence = pending.sequence;
        self.message_count = 0;
        self.last_used_at = Timestamp::now();
        self.is_rekeying = false;
        self.pending_rekey = None;
    }
}

/// Per-remote-identity session record.
///
/// Shared between tasks as `Arc<Session>`; interior mutability via
/// the internal lock keeps transitions serialized.
pub struct Session {
    peer: PeerId,
    state: RwLock<SessionState>,
}

impl Session {
    /// Creates a fresh session holding a newly generated ephemeral
    /// keypair and no shared key yet.
    pub fn fresh(peer: PeerId, ephemeral: EphemeralKeypair) -> Self {
        let now = Timestamp::now();
        Self {
            peer,
            state: RwLock::new(SessionState {
                shared_key: None,
                ephemeral,
                created_at: now,
                last_used_at: now,
                message_count: 0,
                rekey_sequence: 0,
                is_rekeying: false,
                pending_rekey: None,
            }),
        }
    }

    /// Creates an established session from an already computed shared
    /// key (the responder path, where ECDH runs before the session is
    /// stored).
    pub fn established(peer: PeerId, ephemeral: EphemeralKeypair, shared: SharedKey) -> Self {
        let session = Self::fresh(peer, ephemeral);
        session.write().shared_key = Some(shared);
        session
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// The remote identity this session is bound to.
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Whether a shared key is present.
    pub fn is_established(&self) -> bool {
        self.read().shared_key.is_some()
    }

    /// Whether a rekey is currently in flight.
    pub fn is_rekeying(&self) -> bool {
        self.read().is_rekeying
    }

    /// Messages counted against the current key.
    pub fn message_count(&self) -> u64 {
        self.read().message_count
    }

    /// The current rekey sequence number.
    pub fn rekey_sequence(&self) -> u64 {
        self.read().rekey_sequence
    }

    /// When this session was created.
    pub fn created_at(&self) -> Timestamp {
        self.read().created_at
    }

    /// When this session last carried a message.
    pub fn last_used_at(&self) -> Timestamp {
        self.read().last_used_at
    }

    /// Returns a snapshot of the current shared key.
    ///
    /// The snapshot is taken under the shared lock and the lock is
    /// released before the caller performs any I/O with it.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Session`] if the session is not
    /// established.
    pub fn shared_key(&self) -> Result<SharedKey> {
        self.read()
            .shared_key
            .clone()
            .ok_or_else(|| SottochatError::Session {
                reason: format!("session with {} is not established", self.peer),
            })
    }

    /// Whether the session has exceeded its lifetime.
    pub fn is_expired(&self, lifetime: Duration) -> bool {
        self.read().created_at.elapsed() >= lifetime
    }

    // -----------------------------------------------------------------
    // Use accounting
    // -----------------------------------------------------------------

    /// Counts one message against this session and reports whether a
    /// rekey is due.
    ///
    /// Atomically increments `message_count`, updates `last_used_at`,
    /// and evaluates the rekey condition: not already rekeying, and
    /// either the message threshold or the age threshold reached.
    pub fn record_use(&self, rekey_after_messages: u64, rekey_after_duration: Duration) -> bool {
        let mut state = self.write();
        state.message_count += 1;
        state.last_used_at = Timestamp::now();

        !state.is_rekeying
            && (state.message_count >= rekey_after_messages
                || state.created_at.elapsed() >= rekey_after_duration)
    }

    // -----------------------------------------------------------------
    // Establishment
    // -----------------------------------------------------------------

    /// Completes establishment: computes the shared key from our
    /// ephemeral secret and the counterpart's ephemeral public key.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Session`] if the session is already
    ///   established.
    /// - [`SottochatError::Crypto`] if ECDH yields the all-zero
    ///   point.
    pub fn complete(&self, remote_ephemeral_public: &[u8; 32]) -> Result<()> {
        let mut state = self.write();
        if state.shared_key.is_some() {
            return Err(SottochatError::Session {
                reason: format!("session with {} is already established", self.peer),
            });
        }

        let shared = state.ephemeral.diffie_hellman(remote_ephemeral_public)?;
        state.shared_key = Some(shared);
        state.last_used_at = Timestamp::now();
        Ok(())
    }

    // -----------------------------------------------------------------
    // Rekeying
    // -----------------------------------------------------------------

    /// Starts a rekey as initiator: generates a new ephemeral keypair
    /// and parks it in the pending slot with the next sequence
    /// number.
    ///
    /// Returns the new ephemeral public key and the sequence number
    /// to advertise.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Session`] if the session is not
    /// established or a rekey is already in progress.
    pub fn begin_rekey(&self) -> Result<([u8; 32], u64)> {
        let mut state = self.write();
        if state.shared_key.is_none() {
            return Err(SottochatError::Session {
                reason: format!("session with {} is not established", self.peer),
            });
        }
        if state.is_rekeying {
            return Err(SottochatError::Session {
                reason: format!("rekey already in progress with {}", self.peer),
            });
        }

        let ephemeral = EphemeralKeypair::generate();
        let public = ephemeral.public_bytes();
        let sequence = state.rekey_sequence + 1;

        state.is_rekeying = true;
        state.pending_rekey = Some(PendingRekey {
            ephemeral,
            shared_key: None,
            sequence,
            initiated_at: Timestamp::now(),
            role: RekeyRole::Initiator,
        });

        Ok((public, sequence))
    }

    /// Accepts a rekey request as responder: generates a new
    /// ephemeral keypair, computes the new shared key against the
    /// initiator's ephemeral public key, and parks both in the
    /// pending slot.
    ///
    /// If we had our own rekey in flight with a lower sequence, that
    /// pending state is dropped: sequence numbers break simultaneous
    /// initiation ties, and the caller has already checked that
    /// `sequence` is strictly greater than the session's current
    /// value.
    ///
    /// Returns our new ephemeral public key.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Session`] if the session is not
    ///   established.
    /// - [`SottochatError::Crypto`] if ECDH yields the all-zero
    ///   point.
    pub fn accept_rekey(&self, remote_ephemeral_public: &[u8; 32], sequence: u64) -> Result<[u8; 32]> {
        let mut state = self.write();
        if state.shared_key.is_none() {
            return Err(SottochatError::Session {
                reason: format!("session with {} is not established", self.peer),
            });
        }

        if state.is_rekeying {
            tracing::debug!(
                peer = %self.peer,
                sequence,
                "dropping own pending rekey in favor of higher-sequence request"
            );
            state.is_rekeying = false;
            state.pending_rekey = None;
        }

        let ephemeral = EphemeralKeypair::generate();
        let public = ephemeral.public_bytes();
        let shared = ephemeral.diffie_hellman(remote_ephemeral_public)?;

        state.is_rekeying = true;
        state.pending_rekey = Some(PendingRekey {
            ephemeral,
            shared_key: Some(shared),
            sequence,
            initiated_at: Timestamp::now(),
            role: RekeyRole::Responder,
        });

        Ok(public)
    }

    /// Completes a rekey as initiator: computes the new shared key
    /// from the pending ephemeral secret and the responder's
    /// ephemeral public key, then atomically swaps key material,
    /// sequence, and counters.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Session`] if no rekey is in progress or
    ///   the pending role is not initiator.
    /// - [`SottochatError::Protocol`] if `sequence` does not match
    ///   the pending rekey.
    /// - [`SottochatError::Crypto`] if ECDH yields the all-zero
    ///   point (pending state is preserved for the sweeper).
    pub fn apply_rekey_response(
        &self,
        remote_ephemeral_public: &[u8; 32],
        sequence: u64,
    ) -> Result<()> {
        let mut state = self.write();

        let is_rekeying = state.is_rekeying;
        let pending = state
            .pending_rekey
            .as_ref()
            .filter(|_| is_rekeying)
            .ok_or_else(|| SottochatError::Session {
                reason: format!("no rekey in progress with {}", self.peer),
            })?;

        if pending.role != RekeyRole::Initiator {
            return Err(SottochatError::Session {
                reason: format!("rekey with {} is not initiator-side", self.peer),
            });
        }
        if pending.sequence != sequence {
            return Err(SottochatError::Protocol {
                reason: format!(
                    "rekey sequence mismatch: pending {}, response {sequence}",
                    pending.sequence
                ),
            });
        }

        let shared = pending.ephemeral.diffie_hellman(remote_ephemeral_public)?;
        let pending = state.pending_rekey.take().expect("pending checked above");
        state.apply_pending(pending, shared);
        Ok(())
    }

    /// Completes a rekey as responder, after the response has been
    /// handed to the stream: swaps in the shared key precomputed by
    /// [`accept_rekey`](Self::accept_rekey).
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Session`] if no responder-side rekey with
    ///   this sequence is pending.
    pub fn finalize_rekey(&self, sequence: u64) -> Result<()> {
        let mut state = self.write();

        let is_rekeying = state.is_rekeying;
        let shared = match state.pending_rekey.as_ref() {
            Some(p) if is_rekeying && p.role == RekeyRole::Responder && p.sequence == sequence => {
                p.shared_key.clone()
            }
            _ => {
                return Err(SottochatError::Session {
                    reason: format!(
                        "no responder-side rekey with sequence {sequence} pending for {}",
                        self.peer
                    ),
                })
            }
        };
        let shared = shared.ok_or_else(|| SottochatError::Session {
            reason: format!("responder rekey with {} has no computed key", self.peer),
        })?;

        let pending = state.pending_rekey.take().expect("pending checked above");
        state.apply_pending(pending, shared);
        Ok(())
    }

    /// Rolls back a rekey that has been pending longer than the grace
    /// period. The session keeps its current key and stays
    /// established; only the pending state is cleared.
    ///
    /// Returns `true` if a stuck rekey was reset.
    pub fn reset_stuck_rekey(&self, grace: Duration) -> bool {
        let mut state = self.write();
        let stuck = state
            .pending_rekey
            .as_ref()
            .map(|p| p.initiated_at.elapsed() >= grace)
            .unwrap_or(false);

        if stuck {
            state.is_rekeying = false;
            state.pending_rekey = None;
        }
        stuck
    }

    // -----------------------------------------------------------------
    // Test helpers
    // -----------------------------------------------------------------

    /// Backdates the session's creation time (tests only).
    #[cfg(test)]
    pub(crate) fn backdate_created(&self, seconds: i64) {
        let mut state = self.write();
        state.created_at = Timestamp::from_datetime(
            *state.created_at.as_datetime() - chrono::Duration::seconds(seconds),
        );
    }

    /// Backdates the pending rekey's initiation time (tests only).
    #[cfg(test)]
    pub(crate) fn backdate_pending(&self, seconds: i64) {
        let mut state = self.write();
        if let Some(pending) = state.pending_rekey.as_mut() {
            pending.initiated_at = Timestamp::from_datetime(
                *pending.initiated_at.as_datetime() - chrono::Duration::seconds(seconds),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
