//! Inbound stream dispatch.
//!
//! The overlay invokes [`MessageHandler::handle_stream`] for every
//! accepted stream under the secure chat protocol. Exactly one
//! envelope is read per stream and dispatched by tag. Every
//! verification uses the stream's authenticated remote identity key,
//! never a key named inside the payload.
//!
//! Parse failures, signature failures, and crypto failures terminate
//! the stream silently: the error is logged locally and nothing is
//! sent back to the remote.

use std::sync::Arc;

use sottochat_crypto::aead::aead_open;
use sottochat_crypto::signing::{identity_to_peer_id, IdentityKeypair, IdentityPublicKey};
use sottochat_protocol::envelope::{read_envelope, write_envelope, Envelope, EnvelopeKind};
use sottochat_protocol::key_exchange::SessionKeyExchange;
use sottochat_protocol::messages::{AckMessage, EncryptedMessage};
use sottochat_session::replay::ReplayCache;
use sottochat_session::store::SessionStore;
use sottochat_types::{PeerId, Result, SottochatError};
use tokio::sync::mpsc;

use crate::events::ChatEvent;
use crate::transport::BoxedStream;

// ---------------------------------------------------------------------------
// MessageHandler
// ---------------------------------------------------------------------------

/// Stateful handler for inbound secure chat streams.
///
/// Holds shared references to the session store, the replay cache,
/// and the host identity. One handler instance serves all inbound
/// streams concurrently.
pub struct MessageHandler {
    store: Arc<SessionStore>,
    replay: Arc<ReplayCache>,
    identity: Arc<IdentityKeypair>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl MessageHandler {
    /// Creates a new handler over shared session state.
    pub fn new(
        store: Arc<SessionStore>,
        replay: Arc<ReplayCache>,
        identity: Arc<IdentityKeypair>,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Self {
        Self {
            store,
            replay,
            identity,
            events,
        }
    }

    /// Serves one inbound stream: reads a single envelope and
    /// dispatches it.
    ///
    /// `remote_key` is the identity public key the overlay
    /// authenticated for this stream; the peer id is derived from it
    /// rather than trusted from any payload field. Failures close the
    /// stream without a reply.
    pub async fn handle_stream(&self, mut stream: BoxedStream, remote_key: IdentityPublicKey) {
        let peer = identity_to_peer_id(&remote_key);

        let envelope = match read_envelope(&mut stream).await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "failed to read inbound envelope");
                return;
            }
        };

        let kind = envelope.kind;
        let outcome = match kind {
            EnvelopeKind::KeyExchange => {
                self.on_key_exchange(&mut stream, &peer, &remote_key, &envelope)
                    .await
            }
            EnvelopeKind::KeyExchangeResponse => {
                self.on_key_exchange_response(&peer, &remote_key, &envelope)
            }
            EnvelopeKind::Rekey => {
                self.on_rekey(&mut stream, &peer, &remote_key, &envelope)
                    .await
            }
            EnvelopeKind::RekeyResponse => self.on_rekey_response(&peer, &remote_key, &envelope),
            EnvelopeKind::Encrypted => self.on_encrypted(&mut stream, &peer, &envelope).await,
            EnvelopeKind::Ack => Err(SottochatError::Protocol {
                reason: "unexpected ack envelope on a fresh inbound stream".into(),
            }),
        };

        if let Err(e) = outcome {
            tracing::warn!(%peer, %kind, error = %e, "inbound envelope dropped");
        }
    }

    // -----------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------

    /// Responder side of the initial handshake. Valid only while no
    /// session exists for the remote identity; the response travels
    /// back on the same stream.
    async fn on_key_exchange(
        &self,
        stream: &mut BoxedStream,
        peer: &PeerId,
        remote_key: &IdentityPublicKey,
        envelope: &Envelope,
    ) -> Result<()> {
        let offer: SessionKeyExchange = envelope.decode_payload()?;

        let (_, response) =
            self.store
                .respond_to_key_exchange(peer, &offer, &self.identity, remote_key)?;

        let reply = Envelope::new(EnvelopeKind::KeyExchangeResponse, &response)?;
        if let Err(e) = write_envelope(stream, &reply).await {
            // The initiator never saw our response; drop the session
            // so its retry can start a clean handshake.
            self.store.remove(peer);
            return Err(e);
        }

        self.emit(ChatEvent::SessionEstablished { peer: *peer });
        Ok(())
    }

    /// Initiator-side completion arriving on a separate inbound
    /// stream. Valid only while a fresh (not yet established) session
    /// exists.
    fn on_key_exchange_response(
        &self,
        peer: &PeerId,
        remote_key: &IdentityPublicKey,
        envelope: &Envelope,
    ) -> Result<()> {
        let response: SessionKeyExchange = envelope.decode_payload()?;

        let session = self.store.get(peer).ok_or_else(|| SottochatError::Session {
            reason: format!("no pending session with {peer}"),
        })?;
        if session.is_established() {
            return Err(SottochatError::Session {
                reason: format!("session with {peer} is already established"),
            });
        }

        self.store.complete_session(&session, &response, remote_key)?;
        self.emit(ChatEvent::SessionEstablished { peer: *peer });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Rekeying
    // -----------------------------------------------------------------

    /// Responder side of a rekey. Valid only for an established
    /// session and a strictly increasing sequence number; the new key
    /// takes effect once the response is on the wire.
    async fn on_rekey(
        &self,
        stream: &mut BoxedStream,
        peer: &PeerId,
        remote_key: &IdentityPublicKey,
        envelope: &Envelope,
    ) -> Result<()> {
        let request: SessionKeyExchange = envelope.decode_payload()?;

        let response =
            self.store
                .handle_rekey_request(peer, &request, &self.identity, remote_key)?;
        let sequence = response.rekey_sequence;

        let reply = Envelope::new(EnvelopeKind::RekeyResponse, &response)?;
        // On write failure the pending rekey stays parked; the
        // sweeper rolls it back after the grace period and the
        // session keeps its old key.
        write_envelope(stream, &reply).await?;

        self.store.finalize_rekey_response(peer, sequence)?;
        self.emit(ChatEvent::SessionRekeyed {
            peer: *peer,
            sequence,
        });
        Ok(())
    }

    /// Initiator-side rekey completion arriving on a separate inbound
    /// stream.
    fn on_rekey_response(
        &self,
        peer: &PeerId,
        remote_key: &IdentityPublicKey,
        envelope: &Envelope,
    ) -> Result<()> {
        let response: SessionKeyExchange = envelope.decode_payload()?;
        let sequence = response.rekey_sequence;

        self.store.complete_rekey(peer, &response, remote_key)?;
        self.emit(ChatEvent::SessionRekeyed {
            peer: *peer,
            sequence,
        });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Encrypted payloads
    // -----------------------------------------------------------------

    /// Decrypts an encrypted message, delivers it exactly once, and
    /// acknowledges on the same stream.
    ///
    /// Replayed message ids are dropped silently: no event, no
    /// acknowledgement, no error back to the remote.
    async fn on_encrypted(
        &self,
        stream: &mut BoxedStream,
        peer: &PeerId,
        envelope: &Envelope,
    ) -> Result<()> {
        let message: EncryptedMessage = envelope.decode_payload()?;

        if !self.replay.check_and_insert(&message.message_id) {
            tracing::debug!(%peer, message_id = %message.message_id, "replayed message dropped");
            return Ok(());
        }

        let session = self.store.get(peer).ok_or_else(|| SottochatError::Session {
            reason: format!("no active session with {peer}, cannot decrypt"),
        })?;
        let key = session.shared_key()?;

        let plaintext = aead_open(key.as_bytes(), &message.payload)?;

        // Count the message against the session so both peers observe
        // usage; rekeys are only ever initiated by the sending side.
        let _ = self.store.use_session(peer);

        self.emit(ChatEvent::MessageReceived {
            from: *peer,
            message_id: message.message_id,
            plaintext,
        });

        let ack = Envelope::new(EnvelopeKind::Ack, &AckMessage::ok(message.message_id))?;
        write_envelope(stream, &ack).await
    }

    fn emit(&self, event: ChatEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("chat event channel closed, consumer may have dropped");
        }
    }
}
