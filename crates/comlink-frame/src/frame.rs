use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Length prefix: 4 bytes, big-endian, counting itself plus the body.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame size (prefix + body): 1 MiB.
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

/// Encode a frame body into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────┐
/// │ Length (4B BE)   │ Body             │
/// │ = 4 + body bytes │ (Length−4 bytes) │
/// └──────────────────┴──────────────────┘
/// ```
pub fn encode_frame(body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let total = LENGTH_PREFIX_SIZE + body.len();
    if total > u32::MAX as usize {
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: u32::MAX as usize,
        });
    }
    dst.reserve(total);
    dst.put_u32(total as u32);
    dst.put_slice(body);
    Ok(())
}

/// Decode one frame body from a reassembly buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. The declared
/// length must cover the prefix itself and stay within `max_frame`; a
/// violation means the stream is corrupt and the error is fatal upstream.
pub fn decode_frame(src: &mut BytesMut, max_frame: usize) -> Result<Option<Bytes>> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None); // Need more data
    }

    let declared = u32::from_be_bytes(src[0..LENGTH_PREFIX_SIZE].try_into().unwrap());
    if (declared as usize) < LENGTH_PREFIX_SIZE {
        return Err(FrameError::InvalidLength {
            declared,
            minimum: LENGTH_PREFIX_SIZE as u32,
        });
    }
    let total = declared as usize;
    if total > max_frame {
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: max_frame,
        });
    }

    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(LENGTH_PREFIX_SIZE);
    let body = src.split_to(total - LENGTH_PREFIX_SIZE).freeze();
    Ok(Some(body))
}
