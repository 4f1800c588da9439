use std::time::Duration;

use comlink_frame::DEFAULT_MAX_FRAME;

/// Default poll timeout shared by all pipeline stages.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default capacity of each bounded hand-off queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Configuration for one channel's pipeline.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Poll timeout for every stage's blocking wait. Shutdown requests are
    /// observed within one interval at every stage.
    pub poll_interval: Duration,
    /// Maximum frame size (length prefix + body). Oversized frames fail the
    /// channel. Default: 1 MiB.
    pub max_frame_size: usize,
    /// Capacity of each of the four bounded hand-off queues.
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_frame_size: DEFAULT_MAX_FRAME,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
