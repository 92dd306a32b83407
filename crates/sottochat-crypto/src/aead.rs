//! XChaCha20-Poly1305 authenticated encryption.
//!
//! All payload encryption uses XChaCha20-Poly1305 with 192-bit
//! (24-byte) nonces. Every seal draws a fresh nonce from OS entropy
//! and prepends it to the ciphertext, so the wire blob is
//! self-contained: `nonce(24) ∥ ciphertext ∥ tag(16)`. Counter-based
//! nonces are not supported; keys are replaced by rekeying rather
//! than per message, so randomness is the only safe nonce source.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sottochat_types::{Result, SottochatError};

/// Byte length of an XChaCha20-Poly1305 nonce.
pub const NONCE_LEN: usize = 24;

/// Byte length of the Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;

/// Encrypts `plaintext` under `key`, returning `nonce ∥ ciphertext`.
///
/// A fresh 24-byte random nonce is generated per call. The 192-bit
/// nonce space makes accidental collision negligible for any
/// realistic message volume under one key.
///
/// # Errors
///
/// Returns [`SottochatError::Crypto`] if encryption fails.
pub fn aead_seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SottochatError::Crypto {
            reason: format!("XChaCha20-Poly1305 encryption failed: {e}"),
        })?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend(ciphertext);
    Ok(blob)
}

/// Decrypts a `nonce ∥ ciphertext` blob produced by [`aead_seal`].
///
/// # Errors
///
/// Returns [`SottochatError::Crypto`] if the blob is shorter than a
/// nonce or if tag verification fails (wrong key, tampering).
pub fn aead_open(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(SottochatError::Crypto {
            reason: format!(
                "ciphertext too short: {} bytes, need at least {NONCE_LEN}",
                blob.len()
            ),
        });
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| SottochatError::Crypto {
            reason: format!("XChaCha20-Poly1305 decryption failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
