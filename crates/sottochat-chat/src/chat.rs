//! The secure chat facade.
//!
//! [`SecureChat`] owns every long-lived object of the session core:
//! the session store, the replay cache, the inbound handler, the
//! outbound sender, and the background sweeper. The store and cache
//! are explicit values injected into handler and sender by reference,
//! so several hosts can coexist in one process and tests can build
//! isolated instances.

use std::sync::Arc;

use sottochat_crypto::signing::IdentityKeypair;
use sottochat_session::replay::ReplayCache;
use sottochat_session::session::Session;
use sottochat_session::store::SessionStore;
use sottochat_types::config::SecureChatConfig;
use sottochat_types::{PeerId, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::ChatEvent;
use crate::handler::MessageHandler;
use crate::sender::MessageSender;
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// SecureChat
// ---------------------------------------------------------------------------

/// Coordinator for one host's secure messaging state.
///
/// Constructed once per host identity. The overlay must register
/// [`handler`](Self::handler) as the inbound stream handler under
/// [`PROTOCOL_ID`](crate::PROTOCOL_ID), passing each accepted
/// stream's authenticated remote identity key.
pub struct SecureChat {
    local_peer: PeerId,
    store: Arc<SessionStore>,
    handler: Arc<MessageHandler>,
    sender: MessageSender,
    cancel: CancellationToken,
}

impl SecureChat {
    /// Builds the secure messaging stack and spawns the background
    /// sweeper. Must be called within a tokio runtime.
    ///
    /// Returns the facade together with the receiving end of the
    /// event channel.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Config`] if the configuration is
    /// invalid.
    ///
    /// [`SottochatError::Config`]: sottochat_types::SottochatError::Config
    pub fn new(
        identity: IdentityKeypair,
        transport: Arc<dyn Transport>,
        config: SecureChatConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChatEvent>)> {
        config.validate()?;

        let identity = Arc::new(identity);
        let local_peer = identity.peer_id();
        let store = Arc::new(SessionStore::new(config.clone()));
        let replay = Arc::new(ReplayCache::new(config.replay_cache_capacity));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handler = Arc::new(MessageHandler::new(
            Arc::clone(&store),
            replay,
            Arc::clone(&identity),
            event_tx,
        ));
        let sender = MessageSender::new(
            transport,
            Arc::clone(&store),
            identity,
            config.clone(),
            cancel.clone(),
        );

        spawn_sweeper(Arc::clone(&store), config, cancel.clone());

        Ok((
            Self {
                local_peer,
                store,
                handler,
                sender,
                cancel,
            },
            event_rx,
        ))
    }

    /// This host's peer id.
    pub fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }

    /// The inbound stream handler for the overlay to register.
    pub fn handler(&self) -> Arc<MessageHandler> {
        Arc::clone(&self.handler)
    }

    /// Sends an encrypted message and waits for acknowledgement.
    ///
    /// Establishes the session and rekeys automatically as needed.
    pub async fn send(&self, peer: &PeerId, plaintext: &[u8]) -> Result<()> {
        self.sender.send(peer, plaintext).await
    }

    /// Establishes a session with `peer` without sending a message.
    pub async fn initiate_chat(&self, peer: &PeerId) -> Result<()> {
        self.sender.establish(peer).await
    }

    /// Whether an established session exists with `peer`.
    pub fn has_session(&self, peer: &PeerId) -> bool {
        self.store.has_session(peer)
    }

    /// Returns the live session with `peer`, if any.
    pub fn session(&self, peer: &PeerId) -> Option<Arc<Session>> {
        self.store.get(peer)
    }

    /// Closes the session with `peer`, discarding its key material.
    pub fn close_session(&self, peer: &PeerId) {
        self.store.remove(peer);
    }

    /// Lists peers with live sessions.
    pub fn active_sessions(&self) -> Vec<PeerId> {
        self.store.active_sessions()
    }

    /// Cancels in-flight operations and stops the sweeper.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SecureChat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

/// Spawns the periodic sweep task: evicts expired sessions and rolls
/// back rekeys stuck past the grace period.
fn spawn_sweeper(store: Arc<SessionStore>, config: SecureChatConfig, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so sweeps
        // start one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("session sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let report = store.sweep();
                    if report.expired_removed > 0 || report.rekeys_reset > 0 {
                        tracing::info!(
                            expired = report.expired_removed,
                            rekeys_reset = report.rekeys_reset,
                            "session sweep completed"
                        );
                    }
                }
            }
        }
    });
}
