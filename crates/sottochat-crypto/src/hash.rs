//! SHA3-256 hashing helper.

use sha3::{Digest, Sha3_256};

/// Computes SHA3-256 over the input and returns the 32-byte digest.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let digest = Sha3_256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
