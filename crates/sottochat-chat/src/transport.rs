//! Transport contract consumed from the overlay.
//!
//! The secure messaging layer needs four things from the overlay:
//! opening a bidirectional byte stream to a remote identity under
//! [`PROTOCOL_ID`](crate::PROTOCOL_ID), registering an inbound
//! handler for the same protocol, the remote identity public key on
//! any accepted stream, and identity-key lookup by peer id. The first
//! and last are this trait; inbound registration is the overlay
//! invoking [`MessageHandler::handle_stream`] for each accepted
//! stream, passing the stream's authenticated remote key.
//!
//! Overlay implementations should opt into limited (relayed)
//! connections when dialing: handshakes and acknowledged sends work
//! fine across a relay.
//!
//! Abstracting the overlay behind a trait keeps the protocol logic
//! testable against in-memory streams.
//!
//! [`MessageHandler::handle_stream`]: crate::handler::MessageHandler::handle_stream

use async_trait::async_trait;
use sottochat_crypto::signing::IdentityPublicKey;
use sottochat_types::{PeerId, Result};
use tokio::io::{AsyncRead, AsyncWrite};

/// Object-safe alias for a bidirectional byte stream.
pub trait ChatStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ChatStream for T {}

/// A boxed stream as handed out by the overlay.
pub type BoxedStream = Box<dyn ChatStream>;

/// Overlay operations required by the secure messaging layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a bidirectional stream to `peer` under the secure chat
    /// protocol identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Transport`] if the peer cannot be
    /// dialed.
    ///
    /// [`SottochatError::Transport`]: sottochat_types::SottochatError::Transport
    async fn open_stream(&self, peer: &PeerId) -> Result<BoxedStream>;

    /// Looks up the identity public key for `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Transport`] if the key is unknown.
    ///
    /// [`SottochatError::Transport`]: sottochat_types::SottochatError::Transport
    async fn identity_key(&self, peer: &PeerId) -> Result<IdentityPublicKey>;
}
