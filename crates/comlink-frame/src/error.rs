/// Errors that can occur during frame or message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared frame length is smaller than the length prefix itself.
    #[error("invalid frame length {declared} (minimum {minimum})")]
    InvalidLength { declared: u32, minimum: u32 },

    /// The frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The frame body does not begin with a well-formed JSON envelope.
    #[error("malformed message envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    /// The frame body is empty.
    #[error("empty frame body")]
    EmptyBody,

    /// The envelope's declared payload byte-count disagrees with the bytes
    /// actually trailing the envelope.
    #[error("payload length mismatch (declared {declared}, found {actual})")]
    PayloadMismatch { declared: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
