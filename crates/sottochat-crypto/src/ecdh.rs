//! X25519 key agreement and Ed25519→X25519 conversion.
//!
//! Sessions are keyed by ephemeral X25519 exchanges: each side
//! generates a fresh keypair per session (and per rekey), and the
//! shared key is the X25519 output of one side's ephemeral secret
//! with the other side's ephemeral public key. An all-zero output
//! marks a weak (small-order) peer point and is rejected.
//!
//! Identity keys live on the Edwards curve and cannot act as X25519
//! keys directly; the conversions here project them onto Montgomery
//! form so the same identity can authenticate sessions and, when
//! needed, serve as a long-term Diffie-Hellman key.

use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use sottochat_types::{Result, SottochatError};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::signing::{IdentityKeypair, IdentityPublicKey};

// ---------------------------------------------------------------------------
// SharedKey
// ---------------------------------------------------------------------------

/// 32-byte shared key produced by an X25519 exchange.
///
/// Construction rejects the all-zero value, so a `SharedKey` is never
/// weak. Zeroized on drop.
#[derive(Clone)]
pub struct SharedKey(Zeroizing<[u8; 32]>);

impl SharedKey {
    /// Wraps raw key material, rejecting the all-zero value.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Crypto`] if `bytes` is all zeros.
    pub fn new(bytes: [u8; 32]) -> Result<Self> {
        if bytes == [0u8; 32] {
            return Err(SottochatError::Crypto {
                reason: "weak shared secret detected (all-zero ECDH output)".into(),
            });
        }
        Ok(Self(Zeroizing::new(bytes)))
    }

    /// Returns the raw 32-byte key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// SharedKey does not implement Debug to prevent leakage.

// ---------------------------------------------------------------------------
// EphemeralKeypair
// ---------------------------------------------------------------------------

/// Single-use X25519 keypair for session establishment and rekeying.
///
/// Generated per session and per rekey; never persisted. Stored as a
/// [`StaticSecret`] because the public key must be extractable before
/// Diffie-Hellman runs, and the handshake initiator performs the
/// exchange only after the counterpart's response arrives. The secret
/// zeroizes its memory on drop.
pub struct EphemeralKeypair {
    secret: StaticSecret,
}

impl EphemeralKeypair {
    /// Generates a fresh keypair from OS entropy.
    ///
    /// The raw scalar is stored unclamped; clamping happens inside
    /// the X25519 scalar multiplication.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Reconstructs a keypair from raw scalar bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// Returns the 32-byte Montgomery-form public key.
    pub fn public_bytes(&self) -> [u8; 32] {
        *PublicKey::from(&self.secret).as_bytes()
    }

    /// Performs X25519 with the counterpart's public key.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Crypto`] if the exchange yields the
    /// all-zero point (small-order peer key).
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> Result<SharedKey> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        SharedKey::new(*shared.as_bytes())
    }
}

// EphemeralKeypair does not implement Clone/Debug to prevent leakage.

// ---------------------------------------------------------------------------
// Ed25519 → X25519 conversion
// ---------------------------------------------------------------------------

/// Derives the X25519 secret scalar from an Ed25519 identity keypair.
///
/// Process (RFC 7748 / RFC 8032 compatible):
///
/// 1. `SHA-512(ed25519_seed)` → 64 bytes
/// 2. Clamp the lower 32 bytes: clear the low 3 bits of byte 0,
///    clear bit 7 and set bit 6 of byte 31
/// 3. Return the clamped lower 32 bytes
///
/// Intermediate values are zeroized before returning.
pub fn identity_to_x25519_secret(keypair: &IdentityKeypair) -> Zeroizing<[u8; 32]> {
    let mut seed = keypair.signing_key.to_bytes();
    let digest = Sha512::digest(seed);
    seed.zeroize();

    let mut hash_bytes = [0u8; 64];
    hash_bytes.copy_from_slice(&digest);

    let mut scalar = Zeroizing::new([0u8; 32]);
    scalar.copy_from_slice(&hash_bytes[..32]);
    hash_bytes.zeroize();

    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;

    scalar
}

/// Converts an Ed25519 identity public key to its X25519 (Montgomery
/// u-coordinate) form.
///
/// The Edwards point is decoded and validated, then mapped to the
/// Montgomery curve. The result pairs with the scalar from
/// [`identity_to_x25519_secret`]: for the same identity,
/// `X25519(secret, basepoint)` equals this conversion of the public
/// key.
///
/// # Errors
///
/// Returns [`SottochatError::Crypto`] if the bytes are not a valid
/// Edwards point.
pub fn identity_to_x25519_public(public: &IdentityPublicKey) -> Result<[u8; 32]> {
    let vk = VerifyingKey::from_bytes(public.as_bytes()).map_err(|e| SottochatError::Crypto {
        reason: format!("invalid identity public key: {e}"),
    })?;
    Ok(vk.to_montgomery().to_bytes())
}

/// Performs X25519 between an identity-derived secret and an
/// identity-derived public key.
///
/// Fallback derivation path for when two identities need a long-term
/// shared key without an ephemeral exchange.
///
/// # Errors
///
/// Returns [`SottochatError::Crypto`] on a weak (all-zero) output.
pub fn identity_diffie_hellman(
    local: &IdentityKeypair,
    remote: &IdentityPublicKey,
) -> Result<SharedKey> {
    let scalar = identity_to_x25519_secret(local);
    let remote_x = identity_to_x25519_public(remote)?;
    let secret = StaticSecret::from(*scalar);
    let shared = secret.diffie_hellman(&PublicKey::from(remote_x));
    SharedKey::new(*shared.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
