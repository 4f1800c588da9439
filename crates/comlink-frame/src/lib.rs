//! Length-prefixed framing and message codec for comlink.
//!
//! Every wire unit is a frame: a 4-byte big-endian length (counting itself)
//! followed by the body. The body holds a JSON envelope whose final field
//! states the exact trailing payload byte-count, then the raw payload. Both
//! layers are pure — no I/O, no shared state — so the pipeline stages that
//! call them stay independently testable.

pub mod error;
pub mod frame;
pub mod message;

pub use error::{FrameError, Result};
pub use frame::{decode_frame, encode_frame, DEFAULT_MAX_FRAME, LENGTH_PREFIX_SIZE};
pub use message::{decode_message, encode_message, Message, MessageKind, Metadata};
