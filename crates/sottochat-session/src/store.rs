//! Concurrent session store and the establishment/rekey state machine.
//!
//! The store owns every [`Session`] keyed by remote identity. One
//! store-level lock guards membership; each session's own lock guards
//! its mutable content. Readers take the store lock briefly to clone
//! a session handle, then work against the session lock. Neither lock
//! is ever held across I/O; the protocol layers exchange records
//! between store calls.
//!
//! The record-level operations verify counterpart signatures and
//! freshness before touching session state, so no transition commits
//! on an unauthenticated input.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sottochat_crypto::ecdh::EphemeralKeypair;
use sottochat_crypto::signing::{IdentityKeypair, IdentityPublicKey};
use sottochat_protocol::key_exchange::SessionKeyExchange;
use sottochat_types::config::SecureChatConfig;
use sottochat_types::{PeerId, Result, SottochatError};

use crate::session::Session;

// ---------------------------------------------------------------------------
// SweepReport
// ---------------------------------------------------------------------------

/// Summary of one sweep run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SweepReport {
    /// Sessions removed because they exceeded the lifetime.
    pub expired_removed: usize,
    /// Pending rekeys rolled back after the grace period.
    pub rekeys_reset: usize,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Map from remote identity to session, plus the state machine that
/// drives establishment and rekeying.
///
/// Long-lived: constructed once per host and shared by reference with
/// the sender and handler.
pub struct SessionStore {
    sessions: RwLock<HashMap<PeerId, Arc<Session>>>,
    config: SecureChatConfig,
}

impl SessionStore {
    /// Creates an empty store with the given configuration.
    pub fn new(config: SecureChatConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn map_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PeerId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn map_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PeerId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Returns the session for `peer`, or nothing if absent or
    /// expired. An expired entry is evicted on the spot.
    pub fn get(&self, peer: &PeerId) -> Option<Arc<Session>> {
        let session = self.map_read().get(peer).cloned()?;

        if session.is_expired(self.config.session_lifetime) {
            let mut map = self.map_write();
            // Only evict the entry we looked at; a replacement may
            // have raced in.
            if map
                .get(peer)
                .map(|s| Arc::ptr_eq(s, &session))
                .unwrap_or(false)
            {
                map.remove(peer);
                tracing::debug!(%peer, "evicted expired session on access");
            }
            return None;
        }

        Some(session)
    }

    /// Inserts a session, replacing any existing entry.
    pub fn put(&self, session: Arc<Session>) {
        self.map_write().insert(*session.peer(), session);
    }

    /// Removes the session for `peer`.
    pub fn remove(&self, peer: &PeerId) {
        self.map_write().remove(peer);
    }

    /// Whether an established session exists for `peer`.
    pub fn has_session(&self, peer: &PeerId) -> bool {
        self.get(peer).map(|s| s.is_established()).unwrap_or(false)
    }

    /// Lists peers with live (non-expired) sessions.
    pub fn active_sessions(&self) -> Vec<PeerId> {
        self.map_read()
            .values()
            .filter(|s| !s.is_expired(self.config.session_lifetime))
            .map(|s| *s.peer())
            .collect()
    }

    /// Atomically counts one message against the session for `peer`
    /// and reports whether a rekey is due.
    ///
    /// Returns nothing if there is no established session.
    pub fn use_session(&self, peer: &PeerId) -> Option<(Arc<Session>, bool)> {
        let session = self.get(peer)?;
        if !session.is_established() {
            return None;
        }
        let needs_rekey = session.record_use(
            self.config.rekey_after_messages,
            self.config.rekey_after_duration,
        );
        Some((session, needs_rekey))
    }

    // -----------------------------------------------------------------
    // Establishment
    // -----------------------------------------------------------------

    /// Starts a handshake as initiator: generates an ephemeral
    /// keypair, stores a fresh (not yet established) session, and
    /// returns it with the signed key-exchange record to send.
    ///
    /// Re-initiating before establishment replaces the previous fresh
    /// entry rather than creating a second session.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Session`] if an established session
    /// already exists for `peer`.
    pub fn initiate_session(
        &self,
        peer: &PeerId,
        identity: &IdentityKeypair,
    ) -> Result<(Arc<Session>, SessionKeyExchange)> {
        let ephemeral = EphemeralKeypair::generate();
        let exchange =
            SessionKeyExchange::create(ephemeral.public_bytes(), identity, *peer, false, 0);
        let session = Arc::new(Session::fresh(*peer, ephemeral));

        {
            let mut map = self.map_write();
            if let Some(existing) = map.get(peer) {
                if existing.is_established()
                    && !existing.is_expired(self.config.session_lifetime)
                {
                    return Err(SottochatError::Session {
                        reason: format!("session with {peer} is already established"),
                    });
                }
            }
            map.insert(*peer, Arc::clone(&session));
        }

        Ok((session, exchange))
    }

    /// Completes an initiator-side handshake with the counterpart's
    /// response: verifies the record, computes the shared key, and
    /// commits the session to the store.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Protocol`] on a stale timestamp, bad
    ///   signature, or a record carrying the rekey flag.
    /// - [`SottochatError::Crypto`] on a weak ECDH output; nothing is
    ///   committed.
    /// - [`SottochatError::Session`] if the session was already
    ///   established.
    pub fn complete_session(
        &self,
        session: &Arc<Session>,
        remote: &SessionKeyExchange,
        remote_identity: &IdentityPublicKey,
    ) -> Result<()> {
        remote.verify(remote_identity, self.config.handshake_timestamp_window)?;
        if remote.is_rekey {
            return Err(SottochatError::Protocol {
                reason: "unexpected rekey flag on initial key exchange".into(),
            });
        }

        session.complete(&remote.ephemeral_public)?;
        self.put(Arc::clone(session));

        tracing::info!(peer = %session.peer(), "session established");
        Ok(())
    }

    /// Runs the responder side of a handshake: verifies the
    /// initiator's record, generates an ephemeral keypair, computes
    /// the shared key, stores the session as established, and returns
    /// the signed response record.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Session`] if a session already exists for
    ///   `peer`.
    /// - [`SottochatError::Protocol`] on a stale timestamp, bad
    ///   signature, or a record carrying the rekey flag.
    /// - [`SottochatError::Crypto`] on a weak ECDH output; no session
    ///   is stored.
    pub fn respond_to_key_exchange(
        &self,
        peer: &PeerId,
        remote: &SessionKeyExchange,
        identity: &IdentityKeypair,
        remote_identity: &IdentityPublicKey,
    ) -> Result<(Arc<Session>, SessionKeyExchange)> {
        remote.verify(remote_identity, self.config.handshake_timestamp_window)?;
        if remote.is_rekey {
            return Err(SottochatError::Protocol {
                reason: "unexpected rekey flag on initial key exchange".into(),
            });
        }

        let ephemeral = EphemeralKeypair::generate();
        let shared = ephemeral.diffie_hellman(&remote.ephemeral_public)?;
        let response =
            SessionKeyExchange::create(ephemeral.public_bytes(), identity, *peer, false, 0);
        let session = Arc::new(Session::established(*peer, ephemeral, shared));

        {
            let mut map = self.map_write();
            if let Some(existing) = map.get(peer) {
                if !existing.is_expired(self.config.session_lifetime) {
                    return Err(SottochatError::Session {
                        reason: format!("session with {peer} already exists"),
                    });
                }
            }
            map.insert(*peer, Arc::clone(&session));
        }

        tracing::info!(%peer, "session established (responder)");
        Ok((session, response))
    }

    // -----------------------------------------------------------------
    // Rekeying
    // -----------------------------------------------------------------

    /// Starts a rekey as initiator and returns the signed rekey
    /// record to send.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Session`] if no established session
    /// exists or a rekey is already in progress.
    pub fn initiate_rekey(
        &self,
        peer: &PeerId,
        identity: &IdentityKeypair,
    ) -> Result<SessionKeyExchange> {
        let session = self.get(peer).ok_or_else(|| SottochatError::Session {
            reason: format!("no active session with {peer}"),
        })?;

        let (public, sequence) = session.begin_rekey()?;
        tracing::debug!(%peer, sequence, "rekey initiated");
        Ok(SessionKeyExchange::create(
            public, identity, *peer, true, sequence,
        ))
    }

    /// Handles an inbound rekey request as responder and returns the
    /// signed response record. The session's pending slot now holds
    /// the precomputed new key;
    /// [`finalize_rekey_response`](Self::finalize_rekey_response)
    /// swaps it in once the response has been written to the stream.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Session`] if no established session
    ///   exists.
    /// - [`SottochatError::Protocol`] on verification failure, a
    ///   missing rekey flag, or a sequence not strictly greater than
    ///   the session's current value.
    /// - [`SottochatError::Crypto`] on a weak ECDH output.
    pub fn handle_rekey_request(
        &self,
        peer: &PeerId,
        remote: &SessionKeyExchange,
        identity: &IdentityKeypair,
        remote_identity: &IdentityPublicKey,
    ) -> Result<SessionKeyExchange> {
        let session = self.get(peer).ok_or_else(|| SottochatError::Session {
            reason: format!("no active session with {peer}"),
        })?;

        remote.verify(remote_identity, self.config.handshake_timestamp_window)?;
        if !remote.is_rekey {
            return Err(SottochatError::Protocol {
                reason: "rekey record without rekey flag".into(),
            });
        }
        if remote.rekey_sequence <= session.rekey_sequence() {
            return Err(SottochatError::Protocol {
                reason: format!(
                    "stale rekey sequence {} (current {})",
                    remote.rekey_sequence,
                    session.rekey_sequence()
                ),
            });
        }

        let public = session.accept_rekey(&remote.ephemeral_public, remote.rekey_sequence)?;
        tracing::debug!(%peer, sequence = remote.rekey_sequence, "rekey request accepted");
        Ok(SessionKeyExchange::create(
            public,
            identity,
            *peer,
            true,
            remote.rekey_sequence,
        ))
    }

    /// Completes an initiator-side rekey with the counterpart's
    /// response: verifies, confirms the sequence matches the pending
    /// rekey, and atomically swaps in the new key material.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Session`] if no session or no pending
    ///   initiator-side rekey exists.
    /// - [`SottochatError::Protocol`] on verification failure, a
    ///   missing rekey flag, or a sequence mismatch.
    /// - [`SottochatError::Crypto`] on a weak ECDH output; the
    ///   pending state is left for the sweeper.
    pub fn complete_rekey(
        &self,
        peer: &PeerId,
        response: &SessionKeyExchange,
        remote_identity: &IdentityPublicKey,
    ) -> Result<()> {
        let session = self.get(peer).ok_or_else(|| SottochatError::Session {
            reason: format!("no active session with {peer}"),
        })?;

        response.verify(remote_identity, self.config.handshake_timestamp_window)?;
        if !response.is_rekey {
            return Err(SottochatError::Protocol {
                reason: "rekey response without rekey flag".into(),
            });
        }

        session.apply_rekey_response(&response.ephemeral_public, response.rekey_sequence)?;
        tracing::info!(%peer, sequence = response.rekey_sequence, "rekey completed");
        Ok(())
    }

    /// Completes a responder-side rekey after the response record has
    /// been written to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Session`] if no matching
    /// responder-side rekey is pending.
    pub fn finalize_rekey_response(&self, peer: &PeerId, sequence: u64) -> Result<()> {
        let session = self.get(peer).ok_or_else(|| SottochatError::Session {
            reason: format!("no active session with {peer}"),
        })?;

        session.finalize_rekey(sequence)?;
        tracing::info!(%peer, sequence, "rekey completed (responder)");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Sweeping
    // -----------------------------------------------------------------

    /// Removes expired sessions and rolls back rekeys stuck past the
    /// grace period. Stuck rekeys reset to the old key; the session
    /// itself is kept.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut map = self.map_write();

        map.retain(|peer, session| {
            if session.is_expired(self.config.session_lifetime) {
                tracing::debug!(%peer, "sweeper removed expired session");
                report.expired_removed += 1;
                return false;
            }
            if session.reset_stuck_rekey(self.config.rekey_grace) {
                tracing::warn!(%peer, "sweeper reset stuck rekey");
                report.rekeys_reset += 1;
            }
            true
        });

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> SecureChatConfig {
        SecureChatConfig::default()
    }

    fn alice() -> IdentityKeypair {
        IdentityKeypair::from_seed(&[0xAA; 32])
    }

    fn bob() -> IdentityKeypair {
        IdentityKeypair::from_seed(&[0xBB; 32])
    }

    /// Runs a full handshake between two stores and returns both
    /// session handles (initiator side first).
    fn handshake(
        a_store: &SessionStore,
        b_store: &SessionStore,
    ) -> (Arc<Session>, Arc<Session>) {
        let a_id = alice();
        let b_id = bob();
        let a_peer = a_id.peer_id();
        let b_peer = b_id.peer_id();

        let (a_session, offer) = a_store.initiate_session(&b_peer, &a_id).unwrap();
        let (b_session, response) = b_store
            .respond_to_key_exchange(&a_peer, &offer, &b_id, &a_id.public_key())
            .unwrap();
        a_store
            .complete_session(&a_session, &response, &b_id.public_key())
            .unwrap();

        (a_session, b_session)
    }

    #[test]
    fn handshake_establishes_matching_keys() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());

        let (a, b) = handshake(&a_store, &b_store);
        assert!(a.is_established());
        assert!(b.is_established());
        assert_eq!(
            a.shared_key().unwrap().as_bytes(),
            b.shared_key().unwrap().as_bytes()
        );
    }

    #[test]
    fn get_absent_returns_none() {
        let store = SessionStore::new(config());
        assert!(store.get(&PeerId::new([0x01; 32])).is_none());
    }

    #[test]
    fn initiator_reinitiation_replaces_fresh_session() {
        let store = SessionStore::new(config());
        let a_id = alice();
        let b_peer = bob().peer_id();

        let (first, _) = store.initiate_session(&b_peer, &a_id).unwrap();
        let (second, _) = store.initiate_session(&b_peer, &a_id).unwrap();

        // One entry only, and it is the latest attempt.
        assert_eq!(store.active_sessions().len(), 1);
        let current = store.get(&b_peer).unwrap();
        assert!(!Arc::ptr_eq(&current, &first));
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[test]
    fn initiation_rejected_when_established() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        handshake(&a_store, &b_store);

        let result = a_store.initiate_session(&bob().peer_id(), &alice());
        assert!(matches!(result, Err(SottochatError::Session { .. })));
    }

    #[test]
    fn responder_rejects_duplicate_key_exchange() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        let a_id = alice();
        let b_id = bob();

        let (_, offer) = a_store.initiate_session(&b_id.peer_id(), &a_id).unwrap();
        b_store
            .respond_to_key_exchange(&a_id.peer_id(), &offer, &b_id, &a_id.public_key())
            .unwrap();

        // Replaying the same offer must not create a second session.
        let result =
            b_store.respond_to_key_exchange(&a_id.peer_id(), &offer, &b_id, &a_id.public_key());
        assert!(matches!(result, Err(SottochatError::Session { .. })));
        assert_eq!(b_store.active_sessions().len(), 1);
    }

    #[test]
    fn responder_rejects_forged_offer() {
        let b_store = SessionStore::new(config());
        let a_id = alice();
        let b_id = bob();
        let mallory = IdentityKeypair::from_seed(&[0xEE; 32]);

        // Offer signed by Mallory but verified against Alice's key.
        let eph = EphemeralKeypair::generate();
        let offer =
            SessionKeyExchange::create(eph.public_bytes(), &mallory, b_id.peer_id(), false, 0);

        let result =
            b_store.respond_to_key_exchange(&a_id.peer_id(), &offer, &b_id, &a_id.public_key());
        assert!(result.is_err());
        assert!(b_store.get(&a_id.peer_id()).is_none());
    }

    #[test]
    fn responder_rejects_weak_ephemeral_point() {
        let b_store = SessionStore::new(config());
        let a_id = alice();
        let b_id = bob();

        // Correctly signed offer carrying a small-order public key.
        let offer = SessionKeyExchange::create([0u8; 32], &a_id, b_id.peer_id(), false, 0);

        let result =
            b_store.respond_to_key_exchange(&a_id.peer_id(), &offer, &b_id, &a_id.public_key());
        assert!(matches!(result, Err(SottochatError::Crypto { .. })));
        assert!(b_store.get(&a_id.peer_id()).is_none());
    }

    #[test]
    fn use_session_counts_and_reports() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        let (a, _) = handshake(&a_store, &b_store);

        let b_peer = bob().peer_id();
        let (session, needs_rekey) = a_store.use_session(&b_peer).unwrap();
        assert!(Arc::ptr_eq(&session, &a));
        assert!(!needs_rekey);
        assert_eq!(a.message_count(), 1);
    }

    #[test]
    fn use_session_absent_or_fresh_returns_none() {
        let store = SessionStore::new(config());
        let b_peer = bob().peer_id();
        assert!(store.use_session(&b_peer).is_none());

        store.initiate_session(&b_peer, &alice()).unwrap();
        assert!(store.use_session(&b_peer).is_none());
    }

    #[test]
    fn rekey_threshold_reached_by_count() {
        let mut cfg = config();
        cfg.rekey_after_messages = 3;
        let a_store = SessionStore::new(cfg);
        let b_store = SessionStore::new(config());
        handshake(&a_store, &b_store);

        let b_peer = bob().peer_id();
        assert!(!a_store.use_session(&b_peer).unwrap().1);
        assert!(!a_store.use_session(&b_peer).unwrap().1);
        assert!(a_store.use_session(&b_peer).unwrap().1);
    }

    #[test]
    fn full_rekey_between_stores() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        let (a, b) = handshake(&a_store, &b_store);
        let a_id = alice();
        let b_id = bob();
        let old_key = *a.shared_key().unwrap().as_bytes();

        let request = a_store.initiate_rekey(&b_id.peer_id(), &a_id).unwrap();
        let response = b_store
            .handle_rekey_request(&a_id.peer_id(), &request, &b_id, &a_id.public_key())
            .unwrap();
        a_store
            .complete_rekey(&b_id.peer_id(), &response, &b_id.public_key())
            .unwrap();
        b_store
            .finalize_rekey_response(&a_id.peer_id(), response.rekey_sequence)
            .unwrap();

        assert_eq!(a.rekey_sequence(), 1);
        assert_eq!(b.rekey_sequence(), 1);
        assert_eq!(a.message_count(), 0);
        assert_eq!(
            a.shared_key().unwrap().as_bytes(),
            b.shared_key().unwrap().as_bytes()
        );
        assert_ne!(a.shared_key().unwrap().as_bytes(), &old_key);
    }

    #[test]
    fn rekey_with_equal_sequence_rejected() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        handshake(&a_store, &b_store);
        let a_id = alice();
        let b_id = bob();

        // A session sits at sequence 0; a rekey claiming sequence 0
        // is stale.
        let eph = EphemeralKeypair::generate();
        let stale =
            SessionKeyExchange::create(eph.public_bytes(), &a_id, b_id.peer_id(), true, 0);

        let result =
            b_store.handle_rekey_request(&a_id.peer_id(), &stale, &b_id, &a_id.public_key());
        assert!(matches!(result, Err(SottochatError::Protocol { .. })));
    }

    #[test]
    fn rekey_with_next_sequence_accepted() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        handshake(&a_store, &b_store);
        let a_id = alice();
        let b_id = bob();

        let eph = EphemeralKeypair::generate();
        let request =
            SessionKeyExchange::create(eph.public_bytes(), &a_id, b_id.peer_id(), true, 1);

        let result =
            b_store.handle_rekey_request(&a_id.peer_id(), &request, &b_id, &a_id.public_key());
        assert!(result.is_ok());
    }

    #[test]
    fn simultaneous_rekey_tiebreak_by_sequence() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        let (a, b) = handshake(&a_store, &b_store);
        let a_id = alice();
        let b_id = bob();

        // Both sides initiate sequence 1 at once.
        let a_request = a_store.initiate_rekey(&b_id.peer_id(), &a_id).unwrap();
        let b_request = b_store.initiate_rekey(&a_id.peer_id(), &b_id).unwrap();
        assert_eq!(a_request.rekey_sequence, b_request.rekey_sequence);

        // A receives B's request: sequence 1 > current 0, so A drops
        // its own pending rekey and answers as responder.
        let a_response = a_store
            .handle_rekey_request(&b_id.peer_id(), &b_request, &a_id, &b_id.public_key())
            .unwrap();
        b_store
            .complete_rekey(&a_id.peer_id(), &a_response, &a_id.public_key())
            .unwrap();
        a_store
            .finalize_rekey_response(&b_id.peer_id(), a_response.rekey_sequence)
            .unwrap();

        // B's handler would reject A's original request as stale now.
        let result =
            b_store.handle_rekey_request(&a_id.peer_id(), &a_request, &b_id, &a_id.public_key());
        assert!(matches!(result, Err(SottochatError::Protocol { .. })));

        assert_eq!(a.rekey_sequence(), 1);
        assert_eq!(b.rekey_sequence(), 1);
        assert_eq!(
            a.shared_key().unwrap().as_bytes(),
            b.shared_key().unwrap().as_bytes()
        );
    }

    #[test]
    fn sweep_removes_expired_sessions() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        let (a, _) = handshake(&a_store, &b_store);

        a.backdate_created(3601);
        let report = a_store.sweep();
        assert_eq!(report.expired_removed, 1);
        assert!(a_store.get(&bob().peer_id()).is_none());
    }

    #[test]
    fn sweep_resets_stuck_rekey_and_keeps_session() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        let (a, _) = handshake(&a_store, &b_store);
        let key_before = *a.shared_key().unwrap().as_bytes();

        a_store.initiate_rekey(&bob().peer_id(), &alice()).unwrap();
        a.backdate_pending(301);

        let report = a_store.sweep();
        assert_eq!(report.rekeys_reset, 1);
        assert_eq!(report.expired_removed, 0);

        let session = a_store.get(&bob().peer_id()).unwrap();
        assert!(!session.is_rekeying());
        assert_eq!(session.shared_key().unwrap().as_bytes(), &key_before);
    }

    #[test]
    fn sweep_ignores_young_rekey() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        handshake(&a_store, &b_store);

        a_store.initiate_rekey(&bob().peer_id(), &alice()).unwrap();
        let report = a_store.sweep();
        assert_eq!(report.rekeys_reset, 0);

        assert!(a_store.get(&bob().peer_id()).unwrap().is_rekeying());
    }

    #[test]
    fn expired_session_evicted_on_get() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        let (a, _) = handshake(&a_store, &b_store);

        a.backdate_created(3601);
        assert!(a_store.get(&bob().peer_id()).is_none());
        assert!(a_store.active_sessions().is_empty());
    }

    #[test]
    fn stale_handshake_offer_rejected() {
        let b_store = SessionStore::new(config());
        let a_id = alice();
        let b_id = bob();

        let eph = EphemeralKeypair::generate();
        let mut offer =
            SessionKeyExchange::create(eph.public_bytes(), &a_id, b_id.peer_id(), false, 0);
        offer.timestamp = sottochat_types::Timestamp::from_datetime(
            chrono::Utc::now() - chrono::Duration::seconds(600),
        );
        // Signature no longer matches the altered timestamp either,
        // but the freshness check fires first.
        let result =
            b_store.respond_to_key_exchange(&a_id.peer_id(), &offer, &b_id, &a_id.public_key());
        assert!(matches!(result, Err(SottochatError::Protocol { .. })));
        assert!(b_store.get(&a_id.peer_id()).is_none());
    }

    #[test]
    fn complete_rekey_without_pending_rejected() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        handshake(&a_store, &b_store);
        let b_id = bob();

        let eph = EphemeralKeypair::generate();
        let response =
            SessionKeyExchange::create(eph.public_bytes(), &b_id, alice().peer_id(), true, 1);
        let result = a_store.complete_rekey(&b_id.peer_id(), &response, &b_id.public_key());
        assert!(matches!(result, Err(SottochatError::Session { .. })));
    }

    #[test]
    fn double_initiate_rekey_rejected() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        handshake(&a_store, &b_store);

        a_store.initiate_rekey(&bob().peer_id(), &alice()).unwrap();
        let result = a_store.initiate_rekey(&bob().peer_id(), &alice());
        assert!(matches!(result, Err(SottochatError::Session { .. })));
    }

    #[test]
    fn rekey_sequence_is_monotonic_across_rounds() {
        let a_store = SessionStore::new(config());
        let b_store = SessionStore::new(config());
        let (a, _) = handshake(&a_store, &b_store);
        let a_id = alice();
        let b_id = bob();

        for expected in 1..=3u64 {
            let request = a_store.initiate_rekey(&b_id.peer_id(), &a_id).unwrap();
            assert_eq!(request.rekey_sequence, expected);
            let response = b_store
                .handle_rekey_request(&a_id.peer_id(), &request, &b_id, &a_id.public_key())
                .unwrap();
            a_store
                .complete_rekey(&b_id.peer_id(), &response, &b_id.public_key())
                .unwrap();
            b_store
                .finalize_rekey_response(&a_id.peer_id(), response.rekey_sequence)
                .unwrap();
            assert_eq!(a.rekey_sequence(), expected);
        }
    }

    #[test]
    fn sweep_interval_config_is_plumbed() {
        // The store itself never sleeps; it only exposes sweep().
        // Verify the configured durations drive the checks.
        let mut cfg = config();
        cfg.session_lifetime = Duration::from_secs(3600);
        let store = SessionStore::new(cfg);
        assert_eq!(store.sweep().expired_removed, 0);
    }
}
