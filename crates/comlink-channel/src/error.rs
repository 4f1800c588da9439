use crate::flow::Flow;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] comlink_transport::TransportError),

    /// Frame or message codec error.
    #[error("frame error: {0}")]
    Frame(#[from] comlink_frame::FrameError),

    /// The bounded outbound queue is full; the send is refused, never
    /// blocked.
    #[error("outbound queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// The pipeline is not running (never started, or already stopped).
    #[error("channel is not running")]
    NotRunning,

    /// The addressed flow has already closed.
    #[error("{0} flow is closed")]
    FlowClosed(Flow),

    /// A pipeline worker could not be spawned.
    #[error("failed to spawn {name} worker: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
