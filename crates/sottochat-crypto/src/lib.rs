//! Cryptographic primitives for the Sottochat session core.
//!
//! Identity keys are long-lived Ed25519 signing keypairs; session keys
//! are derived from ephemeral X25519 exchanges; payloads are sealed
//! with XChaCha20-Poly1305. The same identity that signs handshakes
//! can be projected onto Curve25519 (Montgomery form) when a
//! long-term Diffie-Hellman key is needed.
//!
//! # Modules
//!
//! - [`signing`] — Ed25519 identity keypairs, signatures, peer-id derivation
//! - [`ecdh`] — ephemeral X25519 key agreement and Ed25519→X25519 conversion
//! - [`aead`] — XChaCha20-Poly1305 sealing with nonce-prefixed blobs
//! - [`hash`] — SHA3-256 helper

pub mod aead;
pub mod ecdh;
pub mod hash;
pub mod signing;
