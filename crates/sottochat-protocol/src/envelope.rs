//! Tagged protocol envelopes and stream framing.
//!
//! An [`Envelope`] is the outer wire message: a `type` tag from a
//! fixed set plus an opaque JSON payload. Parsing proceeds in two
//! stages — the outer `{type, payload}` first, then the inner record
//! by tag — so decoding an envelope never looks inside the payload.
//!
//! Framing on the stream is a 4-byte big-endian length prefix
//! followed by the JSON document. One envelope per protocol step.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sottochat_types::{Result, SottochatError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum accepted frame size in bytes.
///
/// Inbound frames larger than this are rejected before allocation.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

// ---------------------------------------------------------------------------
// EnvelopeKind
// ---------------------------------------------------------------------------

/// The fixed set of envelope tags.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Initial handshake: signed ephemeral key offer.
    KeyExchange,
    /// Handshake reply: the responder's signed ephemeral key.
    KeyExchangeResponse,
    /// Rekey request: signed ephemeral key with a higher sequence.
    Rekey,
    /// Rekey reply: the responder's signed ephemeral key for the
    /// requested sequence.
    RekeyResponse,
    /// AEAD-encrypted application payload.
    Encrypted,
    /// Delivery acknowledgement.
    Ack,
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::KeyExchange => "key_exchange",
            Self::KeyExchangeResponse => "key_exchange_response",
            Self::Rekey => "rekey",
            Self::RekeyResponse => "rekey_response",
            Self::Encrypted => "encrypted",
            Self::Ack => "ack",
        };
        f.write_str(tag)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Outer wire message: a tag plus an opaque payload.
///
/// The payload stays an uninterpreted [`serde_json::Value`] until the
/// dispatcher decodes it with [`Envelope::decode_payload`] based on
/// the tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope tag selecting the payload record type.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Variant-specific record, kept opaque at this layer.
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wraps an inner record into an envelope with the given tag.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Protocol`] if the record cannot be
    /// serialized.
    pub fn new<T: Serialize>(kind: EnvelopeKind, record: &T) -> Result<Self> {
        let payload = serde_json::to_value(record).map_err(|e| SottochatError::Protocol {
            reason: format!("failed to encode {kind} payload: {e}"),
        })?;
        Ok(Self { kind, payload })
    }

    /// Decodes the payload as the record type matching the tag.
    ///
    /// # Errors
    ///
    /// Returns [`SottochatError::Protocol`] if the payload does not
    /// match the expected record layout.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| SottochatError::Protocol {
            reason: format!("failed to decode {} payload: {e}", self.kind),
        })
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Writes one length-prefixed envelope to the stream and flushes.
///
/// # Errors
///
/// Returns [`SottochatError::Protocol`] on serialization failure and
/// [`SottochatError::Transport`] on write failure.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(envelope).map_err(|e| SottochatError::Protocol {
        reason: format!("failed to encode envelope: {e}"),
    })?;

    if body.len() > MAX_FRAME_LEN as usize {
        return Err(SottochatError::Protocol {
            reason: format!("envelope exceeds maximum frame size: {} bytes", body.len()),
        });
    }

    writer
        .write_u32(body.len() as u32)
        .await
        .map_err(transport_err)?;
    writer.write_all(&body).await.map_err(transport_err)?;
    writer.flush().await.map_err(transport_err)?;
    Ok(())
}

/// Reads one length-prefixed envelope from the stream.
///
/// # Errors
///
/// Returns [`SottochatError::Transport`] on read failure or premature
/// end of stream, and [`SottochatError::Protocol`] on an oversized
/// frame or malformed JSON.
pub async fn read_envelope<R>(reader: &mut R) -> Result<Envelope>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await.map_err(transport_err)?;
    if len > MAX_FRAME_LEN {
        return Err(SottochatError::Protocol {
            reason: format!("inbound frame too large: {len} bytes"),
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await.map_err(transport_err)?;

    serde_json::from_slice(&body).map_err(|e| SottochatError::Protocol {
        reason: format!("failed to decode envelope: {e}"),
    })
}

fn transport_err(e: std::io::Error) -> SottochatError {
    SottochatError::Transport {
        reason: format!("stream i/o failed: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
