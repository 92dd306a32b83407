//! Session lifecycle for the Sottochat secure messaging core.
//!
//! A [`session::Session`] binds a remote identity to a shared key,
//! message counters, and rekey state. The [`store::SessionStore`]
//! owns all sessions, drives the establishment and rekey state
//! machine, and is swept periodically to evict expired sessions and
//! roll back stuck rekeys. The [`replay::ReplayCache`] suppresses
//! duplicate delivery of replayed messages.
//!
//! # Modules
//!
//! - [`session`] — per-peer session record and state transitions
//! - [`store`] — concurrent session map and the rekey state machine
//! - [`replay`] — bounded LRU of recently seen message ids

pub mod replay;
pub mod session;
pub mod store;
