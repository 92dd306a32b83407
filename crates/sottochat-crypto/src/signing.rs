//! Ed25519 identity keys and digital signatures.
//!
//! Every peer is identified by a long-lived Ed25519 signing keypair.
//! The keypair signs handshake records; its public half is what the
//! overlay distributes and what [`identity_to_peer_id`] hashes into
//! the peer's overlay identity. The private key is zeroized on drop
//! via `ed25519-dalek`'s built-in `ZeroizeOnDrop`.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sottochat_types::{PeerId, Result, SottochatError};

use crate::hash::sha3_256;

// ---------------------------------------------------------------------------
// IdentityPublicKey
// ---------------------------------------------------------------------------

/// Ed25519 identity public key (32 bytes).
///
/// Used for handshake signature verification and peer-id derivation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IdentityPublicKey([u8; 32]);

impl IdentityPublicKey {
    /// Fixed byte length of an Ed25519 public key.
    pub const LEN: usize = 32;

    /// Creates an [`IdentityPublicKey`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying 32-byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Fixed byte length of an Ed25519 signature.
    pub const LEN: usize = 64;

    /// Creates a [`Signature`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying 64-byte array.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Returns the signature as a freshly allocated byte vector, the
    /// form carried inside wire records.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

// ---------------------------------------------------------------------------
// IdentityKeypair
// ---------------------------------------------------------------------------

/// Long-lived Ed25519 identity keypair.
///
/// Owned by the host process and never serialized. The Montgomery
/// projection for Diffie-Hellman use is computed on demand by
/// [`crate::ecdh::identity_to_x25519_secret`]; the Edwards form here
/// is what produces and verifies signatures.
pub struct IdentityKeypair {
    /// Internal signing key. `pub(crate)` so [`crate::ecdh`] can
    /// derive the X25519 projection without exposing the seed to
    /// external callers.
    pub(crate) signing_key: SigningKey,
}

impl IdentityKeypair {
    /// Generates a new random keypair using OS-level entropy.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Reconstructs a keypair deterministically from a 32-byte seed.
    ///
    /// Given the same seed, this always produces the same keypair.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Returns the public half of this keypair.
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Returns the peer id derived from this keypair's public half.
    pub fn peer_id(&self) -> PeerId {
        identity_to_peer_id(&self.public_key())
    }

    /// Signs an arbitrary message and returns the Ed25519 signature.
    ///
    /// Deterministic: the same keypair + message always yields the
    /// same signature (RFC 8032).
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(message);
        Signature(sig.to_bytes())
    }
}

// IdentityKeypair intentionally does not implement Clone or Debug to
// prevent accidental leakage of the private key in logs or copies.

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Verifies an Ed25519 signature against a public key and message.
///
/// The signature is accepted as a raw byte slice because wire records
/// carry it as variable-length bytes.
///
/// # Errors
///
/// Returns [`SottochatError::Crypto`] if the public key is malformed
/// or the signature has the wrong length, and
/// [`SottochatError::Protocol`] if verification fails.
pub fn verify(public_key: &IdentityPublicKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let vk = VerifyingKey::from_bytes(&public_key.0).map_err(|e| SottochatError::Crypto {
        reason: format!("invalid identity public key: {e}"),
    })?;

    let sig_bytes: [u8; 64] = signature.try_into().map_err(|_| SottochatError::Crypto {
        reason: format!("expected 64-byte signature, got {}", signature.len()),
    })?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    vk.verify_strict(message, &sig)
        .map_err(|e| SottochatError::Protocol {
            reason: format!("signature verification failed: {e}"),
        })
}

/// Derives a [`PeerId`] from an Ed25519 identity public key.
///
/// Process: `PeerId = SHA3-256(public_key_bytes)`.
pub fn identity_to_peer_id(public_key: &IdentityPublicKey) -> PeerId {
    PeerId::new(sha3_256(&public_key.0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
