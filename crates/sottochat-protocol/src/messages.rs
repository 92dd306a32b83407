//! Encrypted message and acknowledgement records.

use serde::{Deserialize, Serialize};
use sottochat_types::{MessageId, PeerId};

// ---------------------------------------------------------------------------
// EncryptedMessage
// ---------------------------------------------------------------------------

/// AEAD-encrypted application payload.
///
/// `from` and `to` are advisory: the cryptographic binding is to the
/// identity keys that established the session, not to these fields.
/// They should carry the sender's and recipient's identities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// Sender identity (advisory).
    pub from: PeerId,
    /// Recipient identity (advisory).
    pub to: PeerId,
    /// AEAD output with the 24-byte nonce prepended.
    pub payload: Vec<u8>,
    /// Unique message identifier used for acknowledgement matching
    /// and replay suppression.
    pub message_id: MessageId,
}

// ---------------------------------------------------------------------------
// AckMessage
// ---------------------------------------------------------------------------

/// Status value of a successful acknowledgement.
pub const ACK_STATUS_OK: &str = "ok";

/// Delivery acknowledgement for one encrypted message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AckMessage {
    /// Outcome flag; [`ACK_STATUS_OK`] on success.
    pub status: String,
    /// The acknowledged message id.
    pub message_id: MessageId,
}

impl AckMessage {
    /// Builds a success acknowledgement for `message_id`.
    pub fn ok(message_id: MessageId) -> Self {
        Self {
            status: ACK_STATUS_OK.to_string(),
            message_id,
        }
    }

    /// Returns `true` if this acknowledgement reports success.
    pub fn is_ok(&self) -> bool {
        self.status == ACK_STATUS_OK
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
