//! Outbound delivery: session establishment, automatic rekey, and
//! acknowledged sends with retry.
//!
//! The caller of [`MessageSender::send`] is always the handshake
//! initiator; roles are never derived from identity ordering. A send
//! opens a fresh stream, writes one `encrypted` envelope, and waits
//! for the matching acknowledgement. Transport failures and
//! acknowledgement timeouts are retried with exponential backoff up
//! to the configured budget; crypto, protocol, and session failures
//! surface immediately.
//!
//! No lock is held across any await point: session key material is
//! snapshotted before stream I/O begins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sottochat_crypto::aead::aead_seal;
use sottochat_crypto::signing::IdentityKeypair;
use sottochat_protocol::envelope::{read_envelope, write_envelope, Envelope, EnvelopeKind};
use sottochat_protocol::key_exchange::SessionKeyExchange;
use sottochat_protocol::messages::{AckMessage, EncryptedMessage};
use sottochat_session::store::SessionStore;
use sottochat_types::config::SecureChatConfig;
use sottochat_types::{MessageId, PeerId, Result, SottochatError};
use tokio_util::sync::CancellationToken;

use crate::retry::{is_retryable, RetryPolicy};
use crate::transport::{BoxedStream, Transport};

// ---------------------------------------------------------------------------
// MessageSender
// ---------------------------------------------------------------------------

/// Outbound half of the secure messaging layer.
pub struct MessageSender {
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
    identity: Arc<IdentityKeypair>,
    config: SecureChatConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl MessageSender {
    /// Creates a sender over shared session state.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<SessionStore>,
        identity: Arc<IdentityKeypair>,
        config: SecureChatConfig,
        cancel: CancellationToken,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            transport,
            store,
            identity,
            config,
            retry,
            cancel,
        }
    }

    /// Sends `plaintext` to `peer`, establishing or rekeying the
    /// session as needed.
    ///
    /// Returns `Ok` only after the counterpart has acknowledged the
    /// message at the protocol layer. Concurrent sends to the same
    /// peer carry no ordering guarantee.
    ///
    /// # Errors
    ///
    /// - [`SottochatError::Transport`] after the retry budget is
    ///   exhausted.
    /// - [`SottochatError::Crypto`] / [`SottochatError::Protocol`] /
    ///   [`SottochatError::Session`] on permanent failures.
    /// - [`SottochatError::Cancelled`] if the caller cancelled.
    pub async fn send(&self, peer: &PeerId, plaintext: &[u8]) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SottochatError::Cancelled);
            }

            match self.try_send(peer, plaintext).await {
                Ok(()) => return Ok(()),
                Err(err) if is_retryable(&err) && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        %peer,
                        error = %err,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "send attempt failed, backing off"
                    );
                    self.backoff_sleep(delay).await?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Establishes a session with `peer` if none exists yet.
    ///
    /// Used by the facade's explicit chat initiation;
    /// [`send`](Self::send) performs the same establishment lazily.
    pub async fn establish(&self, peer: &PeerId) -> Result<()> {
        if self.store.has_session(peer) {
            return Ok(());
        }
        self.establish_session(peer).await
    }

    // -----------------------------------------------------------------
    // One delivery attempt
    // -----------------------------------------------------------------

    async fn try_send(&self, peer: &PeerId, plaintext: &[u8]) -> Result<()> {
        // 1. Count the message against the session, establishing one
        //    first if none exists.
        let (session, needs_rekey) = match self.store.use_session(peer) {
            Some(entry) => entry,
            None => {
                self.establish_session(peer).await?;
                self.store
                    .use_session(peer)
                    .ok_or_else(|| SottochatError::Session {
                        reason: format!("session establishment with {peer} did not complete"),
                    })?
            }
        };

        // 2. Rekey when due. A failed rekey is logged and the send
        //    proceeds under the existing key; the stuck pending state
        //    is rolled back by the sweeper.
        if needs_rekey {
            if let Err(err) = self.rekey_session(peer).await {
                tracing::warn!(%peer, error = %err, "rekey failed, continuing with existing key");
            }
        }

        // 3. Snapshot the key, then do all stream I/O lock-free.
        let key = session.shared_key()?;
        let sealed = aead_seal(key.as_bytes(), plaintext)?;
        drop(key);

        let message = EncryptedMessage {
            from: self.identity.peer_id(),
            to: *peer,
            payload: sealed,
            message_id: MessageId::random(),
        };
        let message_id = message.message_id;

        let mut stream = self.open_stream(peer).await?;
        let envelope = Envelope::new(EnvelopeKind::Encrypted, &message)?;
        self.with_cancel(write_envelope(&mut stream, &envelope))
            .await?;

        // 4. Wait for the acknowledgement on the same stream.
        let reply = self
            .with_cancel(read_with_timeout(&mut stream, self.config.ack_timeout))
            .await?;
        if reply.kind != EnvelopeKind::Ack {
            // Anything other than an ack while waiting for one is
            // treated as transient, like a timeout.
            return Err(SottochatError::Transport {
                reason: format!("expected ack, got {} envelope", reply.kind),
            });
        }

        let ack: AckMessage = reply.decode_payload()?;
        if !ack.is_ok() {
            return Err(SottochatError::Transport {
                reason: format!("negative ack: {}", ack.status),
            });
        }
        if ack.message_id != message_id {
            return Err(SottochatError::Transport {
                reason: format!(
                    "ack for wrong message: sent {message_id}, acked {}",
                    ack.message_id
                ),
            });
        }

        tracing::debug!(%peer, %message_id, "message acknowledged");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Handshake (initiator role)
    // -----------------------------------------------------------------

    async fn establish_session(&self, peer: &PeerId) -> Result<()> {
        let (session, offer) = match self.store.initiate_session(peer, &self.identity) {
            Ok(initiated) => initiated,
            Err(err) => {
                // A concurrent task may have finished the handshake
                // between our lookup and the initiation.
                if self.store.has_session(peer) {
                    return Ok(());
                }
                return Err(err);
            }
        };

        tracing::info!(%peer, "establishing session");

        let outcome: Result<()> = async {
            let remote_key = self.with_cancel(self.transport.identity_key(peer)).await?;
            let mut stream = self.open_stream(peer).await?;

            let envelope = Envelope::new(EnvelopeKind::KeyExchange, &offer)?;
            self.with_cancel(write_envelope(&mut stream, &envelope))
                .await?;

            let reply = self
                .with_cancel(read_with_timeout(&mut stream, self.config.handshake_timeout))
                .await?;
            if reply.kind != EnvelopeKind::KeyExchangeResponse {
                return Err(SottochatError::Protocol {
                    reason: format!("expected key_exchange_response, got {}", reply.kind),
                });
            }

            let response: SessionKeyExchange = reply.decode_payload()?;
            self.store.complete_session(&session, &response, &remote_key)
        }
        .await;

        if outcome.is_err() {
            // Drop the placeholder so a retry starts a clean
            // handshake; never remove a session another task managed
            // to establish meanwhile.
            if let Some(current) = self.store.get(peer) {
                if !current.is_established() {
                    self.store.remove(peer);
                }
            }
        }
        outcome
    }

    // -----------------------------------------------------------------
    // Rekey (initiator role)
    // -----------------------------------------------------------------

    async fn rekey_session(&self, peer: &PeerId) -> Result<()> {
        let request = self.store.initiate_rekey(peer, &self.identity)?;
        let sequence = request.rekey_sequence;

        // The rekey runs on its own stream before further encrypted
        // traffic uses the new key. On failure the pending state is
        // left in place; the sweeper rolls it back after the grace
        // period.
        let remote_key = self.with_cancel(self.transport.identity_key(peer)).await?;
        let mut stream = self.open_stream(peer).await?;

        let envelope = Envelope::new(EnvelopeKind::Rekey, &request)?;
        self.with_cancel(write_envelope(&mut stream, &envelope))
            .await?;

        let reply = self
            .with_cancel(read_with_timeout(&mut stream, self.config.handshake_timeout))
            .await?;
        if reply.kind != EnvelopeKind::RekeyResponse {
            return Err(SottochatError::Protocol {
                reason: format!("expected rekey_response, got {}", reply.kind),
            });
        }

        let response: SessionKeyExchange = reply.decode_payload()?;
        self.store.complete_rekey(peer, &response, &remote_key)?;

        tracing::debug!(%peer, sequence, "rekey round trip complete");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Suspension helpers
    // -----------------------------------------------------------------

    async fn open_stream(&self, peer: &PeerId) -> Result<BoxedStream> {
        self.with_cancel(self.transport.open_stream(peer)).await
    }

    /// Races a fallible operation against caller cancellation.
    async fn with_cancel<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SottochatError::Cancelled),
            result = operation => result,
        }
    }

    async fn backoff_sleep(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SottochatError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Reads one envelope, bounding the wait.
async fn read_with_timeout(stream: &mut BoxedStream, limit: Duration) -> Result<Envelope> {
    match tokio::time::timeout(limit, read_envelope(stream)).await {
        Ok(result) => result,
        Err(_) => Err(SottochatError::Transport {
            reason: format!("timed out after {}ms waiting for response", limit.as_millis()),
        }),
    }
}
