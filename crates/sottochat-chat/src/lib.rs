//! Secure messaging layer for Sottochat.
//!
//! Ties the session core together on top of an abstract overlay
//! transport: the [`handler::MessageHandler`] serves inbound streams,
//! the [`sender::MessageSender`] establishes sessions, rekeys, and
//! delivers encrypted messages with acknowledgement and retry, and
//! [`chat::SecureChat`] wires both to a shared session store, replay
//! cache, and background sweeper.
//!
//! The overlay itself (dialing, relays, peer discovery) stays outside
//! this crate behind the [`transport::Transport`] contract.
//!
//! # Modules
//!
//! - [`transport`] — the overlay contract consumed by this layer
//! - [`events`] — events delivered to the application
//! - [`handler`] — inbound stream dispatch
//! - [`sender`] — outbound delivery with retry and acknowledgement
//! - [`retry`] — retry policy and error classification
//! - [`chat`] — the facade owning all long-lived state

pub mod chat;
pub mod events;
pub mod handler;
pub mod retry;
pub mod sender;
pub mod transport;

pub use sottochat_protocol::PROTOCOL_ID;
