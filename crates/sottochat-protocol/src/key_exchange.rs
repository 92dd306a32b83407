//! Signed ephemeral key-exchange records.
//!
//! A [`SessionKeyExchange`] carries a freshly generated ephemeral
//! X25519 public key together with freshness metadata, authenticated
//! by the sender's identity key. The same record type serves both the
//! initial handshake (`is_rekey = false`, sequence 0) and rekeys
//! (`is_rekey = true`, strictly increasing sequence).
//!
//! # Signature preimage
//!
//! The signature covers exactly this byte string:
//!
//! ```text
//! ephemeral_public ∥ ascii(unix_seconds(timestamp)) ∥ ascii(peer_id)
//!                  ∥ ascii(is_rekey)                ∥ ascii(rekey_sequence)
//! ```
//!
//! where `ascii(is_rekey)` is `"true"` or `"false"`. Conforming
//! implementations must sign and verify this serialization and no
//! other.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sottochat_crypto::signing::{verify, IdentityKeypair, IdentityPublicKey};
use sottochat_types::{PeerId, Result, SottochatError, Timestamp};

// ---------------------------------------------------------------------------
// SessionKeyExchange
// ---------------------------------------------------------------------------

/// Signed ephemeral key offer for session establishment or rekeying.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionKeyExchange {
    /// Freshly generated ephemeral X25519 public key (Montgomery form).
    pub ephemeral_public: [u8; 32],
    /// Creation time; the counterpart rejects records outside its
    /// freshness window.
    pub timestamp: Timestamp,
    /// The intended remote identity. Advisory: the cryptographic
    /// binding is the identity signature, not this field.
    pub peer_id: PeerId,
    /// Distinguishes an initial exchange from a rekey.
    pub is_rekey: bool,
    /// Strictly increasing per session; 0 for the initial exchange.
    pub rekey_sequence: u64,
    /// Ed25519 signature by the sender's identity key over the
    /// preimage documented at module level.
    pub signature: Vec<u8>,
}

impl SessionKeyExchange {
    /// Builds and signs a key-exchange record with the current time.
    pub fn create(
        ephemeral_public: [u8; 32],
        identity: &IdentityKeypair,
        peer_id: PeerId,
        is_rekey: bool,
        rekey_sequence: u64,
    ) -> Self {
        let timestamp = Timestamp::now();
        let preimage =
            signing_preimage(&ephemeral_public, &timestamp, &peer_id, is_rekey, rekey_sequence);
        let signature = identity.sign(&preimage).to_vec();

        Self {
            ephemeral_public,
            timestamp,
            peer_id,
            is_rekey,
            rekey_sequence,
            signature,
        }
    }

    /// Verifies freshness and the identity signature.
    ///
    /// The timestamp must lie within `window` of the local clock in
    /// either direction; a skew of exactly `window` is still
    /// accepted.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Protocol`] if the timestamp is outside the
    ///   window or the signature does not verify.
    /// - [`SottochatError::Crypto`] if the public key or signature is
    ///   malformed.
    pub fn verify(&self, identity: &IdentityPublicKey, window: Duration) -> Result<()> {
        let skew = self.timestamp.skew_seconds();
        if skew.unsigned_abs() > window.as_secs() {
            return Err(SottochatError::Protocol {
                reason: format!(
                    "key exchange timestamp outside freshness window: {skew}s skew, window {}s",
                    window.as_secs()
                ),
            });
        }

        let preimage = signing_preimage(
            &self.ephemeral_public,
            &self.timestamp,
            &self.peer_id,
            self.is_rekey,
            self.rekey_sequence,
        );
        verify(identity, &preimage, &self.signature)
    }
}

/// Builds the exact byte string covered by the record signature.
///
/// Exposed so callers that assemble records with an explicit
/// timestamp can produce a conforming signature.
pub fn signing_preimage(
    ephemeral_public: &[u8; 32],
    timestamp: &Timestamp,
    peer_id: &PeerId,
    is_rekey: bool,
    rekey_sequence: u64,
) -> Vec<u8> {
    let mut preimage = Vec::with_capacity(96);
    preimage.extend_from_slice(ephemeral_public);
    preimage.extend_from_slice(
        format!(
            "{}{}{}{}",
            timestamp.unix_seconds(),
            peer_id,
            is_rekey,
            rekey_sequence
        )
        .as_bytes(),
    );
    preimage
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
