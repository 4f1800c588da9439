use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Ordered string→JSON metadata map.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Message category carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Application exchange: call, cast, register and their returns.
    Exchange,
    /// Resource provisioning: acquire and its return.
    Resources,
}

/// The decoded application-level unit: kind + metadata + payload.
///
/// Built by the sender per operation and consumed once by the receiver.
/// Metadata keys and values are protocol vocabulary; the payload is an
/// opaque binary blob the engine never inspects.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub metadata: Metadata,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageKind, metadata: Metadata, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            metadata,
            payload: payload.into(),
        }
    }

    /// Shorthand for an Exchange-kind message.
    pub fn exchange(metadata: Metadata, payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Exchange, metadata, payload)
    }

    /// Shorthand for a Resources-kind message.
    pub fn resources(metadata: Metadata, payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Resources, metadata, payload)
    }
}

/// Envelope written at the front of every frame body. Field order matters:
/// `payload` (the trailing payload byte-count) is the final field, which is
/// the wire contract for locating the envelope/payload split.
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    kind: MessageKind,
    metadata: &'a Metadata,
    payload: usize,
}

#[derive(Deserialize)]
struct EnvelopeOwned {
    kind: MessageKind,
    metadata: Metadata,
    payload: usize,
}

/// Serialize a message into one frame body: JSON envelope, then the raw
/// payload bytes. Pure — the frame layer adds the length prefix.
pub fn encode_message(message: &Message) -> Result<Bytes> {
    let envelope = serde_json::to_vec(&EnvelopeRef {
        kind: message.kind,
        metadata: &message.metadata,
        payload: message.payload.len(),
    })?;

    let mut body = BytesMut::with_capacity(envelope.len() + message.payload.len());
    body.extend_from_slice(&envelope);
    body.extend_from_slice(&message.payload);
    Ok(body.freeze())
}

/// Parse one frame body back into a message.
///
/// Reads exactly one JSON value off the front, then checks the remaining
/// byte-count against the envelope's declared payload length. Any
/// disagreement means the stream is corrupt.
pub fn decode_message(body: &Bytes) -> Result<Message> {
    let mut stream = serde_json::Deserializer::from_slice(body).into_iter::<EnvelopeOwned>();
    let envelope = match stream.next() {
        Some(parsed) => parsed?,
        None => return Err(FrameError::EmptyBody),
    };
    let split = stream.byte_offset();

    let trailing = body.len() - split;
    if trailing != envelope.payload {
        return Err(FrameError::PayloadMismatch {
            declared: envelope.payload,
            actual: trailing,
        });
    }

    Ok(Message {
        kind: envelope.kind,
        metadata: envelope.metadata,
        payload: body.slice(split..),
    })
}
