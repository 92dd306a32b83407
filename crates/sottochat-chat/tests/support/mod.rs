//! In-memory overlay for end-to-end tests.
//!
//! [`MemoryNetwork`] plays the role of the overlay: it knows every
//! registered peer's identity key and inbound handler, and
//! [`MemoryTransport`] opens duplex pipes to them. Opening a stream
//! spawns the remote handler on the far end, exactly as the overlay
//! would on an accepted stream.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sottochat_chat::handler::MessageHandler;
use sottochat_chat::transport::{BoxedStream, Transport};
use sottochat_crypto::signing::{identity_to_peer_id, IdentityPublicKey};
use sottochat_protocol::envelope::{read_envelope, write_envelope, EnvelopeKind};
use sottochat_types::{PeerId, Result, SottochatError};
use tokio::io::AsyncReadExt;

/// How an inbound stream to a peer behaves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeliveryMode {
    /// Streams reach the peer's handler normally.
    Deliver,
    /// Streams are held open but never answered; the peer's handler
    /// is not invoked. Simulates an unresponsive or partitioned peer.
    BlackHole,
    /// Rekey requests are swallowed in transit (the stream stays open
    /// so the initiator times out waiting for the response); every
    /// other envelope reaches the handler normally. Simulates a
    /// network that loses the rekey exchange.
    DropRekeys,
}

struct Registration {
    identity: IdentityPublicKey,
    handler: Arc<MessageHandler>,
    mode: DeliveryMode,
}

/// Registry of reachable peers.
pub struct MemoryNetwork {
    peers: Mutex<HashMap<PeerId, Registration>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a peer's identity and inbound handler.
    pub fn register(&self, identity: IdentityPublicKey, handler: Arc<MessageHandler>) {
        let peer = identity_to_peer_id(&identity);
        self.peers.lock().unwrap().insert(
            peer,
            Registration {
                identity,
                handler,
                mode: DeliveryMode::Deliver,
            },
        );
    }

    /// Switches how streams to `peer` behave.
    pub fn set_mode(&self, peer: &PeerId, mode: DeliveryMode) {
        if let Some(registration) = self.peers.lock().unwrap().get_mut(peer) {
            registration.mode = mode;
        }
    }
}

/// One host's view of the in-memory overlay.
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    local_identity: IdentityPublicKey,
}

impl MemoryTransport {
    pub fn new(network: Arc<MemoryNetwork>, local_identity: IdentityPublicKey) -> Self {
        Self {
            network,
            local_identity,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open_stream(&self, peer: &PeerId) -> Result<BoxedStream> {
        let (handler, mode) = {
            let peers = self.network.peers.lock().unwrap();
            let registration = peers.get(peer).ok_or_else(|| SottochatError::Transport {
                reason: format!("unknown peer {peer}"),
            })?;
            (Arc::clone(&registration.handler), registration.mode)
        };

        let (near, far) = tokio::io::duplex(64 * 1024);
        let caller_identity = self.local_identity;

        match mode {
            DeliveryMode::Deliver => {
                tokio::spawn(async move {
                    handler.handle_stream(Box::new(far), caller_identity).await;
                });
            }
            DeliveryMode::BlackHole => {
                tokio::spawn(async move {
                    // Keep the stream open and swallow everything
                    // until the caller gives up.
                    let mut far = far;
                    let mut sink = [0u8; 1024];
                    loop {
                        match far.read(&mut sink).await {
                            Ok(0) | Err(_) => return,
                            Ok(_) => {}
                        }
                    }
                });
            }
            DeliveryMode::DropRekeys => {
                tokio::spawn(async move {
                    let mut far = far;
                    let envelope = match read_envelope(&mut far).await {
                        Ok(envelope) => envelope,
                        Err(_) => return,
                    };

                    if envelope.kind == EnvelopeKind::Rekey {
                        // Swallow the request; hold the stream open
                        // until the initiator times out.
                        let mut sink = [0u8; 1024];
                        loop {
                            match far.read(&mut sink).await {
                                Ok(0) | Err(_) => return,
                                Ok(_) => {}
                            }
                        }
                    }

                    // Anything else is relayed to the handler through
                    // an inner pipe, replies flowing back to the
                    // caller.
                    let (mut inner, inner_far) = tokio::io::duplex(64 * 1024);
                    let relay = tokio::spawn(async move {
                        handler
                            .handle_stream(Box::new(inner_far), caller_identity)
                            .await;
                    });
                    if write_envelope(&mut inner, &envelope).await.is_err() {
                        return;
                    }
                    let _ = tokio::io::copy_bidirectional(&mut far, &mut inner).await;
                    let _ = relay.await;
                });
            }
        }

        Ok(Box::new(near))
    }

    async fn identity_key(&self, peer: &PeerId) -> Result<IdentityPublicKey> {
        let peers = self.network.peers.lock().unwrap();
        peers
            .get(peer)
            .map(|registration| registration.identity)
            .ok_or_else(|| SottochatError::Transport {
                reason: format!("no identity key for peer {peer}"),
            })
    }
}
