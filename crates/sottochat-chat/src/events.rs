//! Events delivered from the secure messaging layer to the
//! application.

use sottochat_types::{MessageId, PeerId};

/// Events emitted on the channel returned by
/// [`SecureChat::new`](crate::chat::SecureChat::new).
#[derive(Clone, Debug)]
pub enum ChatEvent {
    /// A message was decrypted and is delivered exactly once.
    MessageReceived {
        /// Identity of the sending peer.
        from: PeerId,
        /// The message identifier.
        message_id: MessageId,
        /// The decrypted payload.
        plaintext: Vec<u8>,
    },
    /// A session with a peer reached the established state.
    SessionEstablished {
        /// The remote identity.
        peer: PeerId,
    },
    /// A session was rekeyed to a new sequence number.
    SessionRekeyed {
        /// The remote identity.
        peer: PeerId,
        /// The sequence number now in effect.
        sequence: u64,
    },
}
