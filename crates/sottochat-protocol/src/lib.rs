//! Wire protocol for the Sottochat secure session core.
//!
//! Every protocol step exchanges exactly one self-describing
//! [`envelope::Envelope`] over a bidirectional byte stream, framed
//! with a length prefix. Envelopes carry a tag and an opaque payload;
//! the payload is only interpreted by the dispatcher, so inner record
//! layouts can evolve independently of the outer framing.
//!
//! # Modules
//!
//! - [`envelope`] — tagged envelopes and length-prefixed framing
//! - [`key_exchange`] — signed ephemeral key-exchange records
//! - [`messages`] — encrypted message and acknowledgement records

pub mod envelope;
pub mod key_exchange;
pub mod messages;

/// Protocol identifier under which secure chat streams are opened and
/// the inbound handler is registered on the overlay.
pub const PROTOCOL_ID: &str = "/secure-chat/1.0.0";
