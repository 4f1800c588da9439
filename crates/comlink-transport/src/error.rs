use std::path::PathBuf;

/// Errors that can occur at the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind a listener.
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to a peer.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Socket path exceeds the platform's `sun_path` limit.
    #[error("socket path too long: {path} ({len} bytes, max {max})")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The readiness multiplexer failed.
    #[error("poll failed: {0}")]
    Poll(std::io::Error),

    /// Generic I/O error on an endpoint.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
