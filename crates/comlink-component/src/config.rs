use comlink_channel::ChannelConfig;

/// What to do with a return whose correlation id resolves no pending
/// operation (the local waiter timed out and moved on, the reply is a
/// duplicate, or the peer is confused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleReplyPolicy {
    /// Trace at debug level and drop.
    Ignore,
    /// Emit a warning diagnostic and drop.
    #[default]
    Warn,
}

/// Default capacity of the component's operation queue.
pub const DEFAULT_OP_QUEUE_CAPACITY: usize = 64;

/// Configuration for one component instance.
#[derive(Debug, Clone)]
pub struct ComponentConfig {
    /// Pipeline configuration for the component's channel.
    pub channel: ChannelConfig,
    /// Stale-reply handling policy.
    pub stale_reply_policy: StaleReplyPolicy,
    /// Capacity of the bounded queue feeding the dispatch thread.
    pub op_queue_capacity: usize,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            stale_reply_policy: StaleReplyPolicy::default(),
            op_queue_capacity: DEFAULT_OP_QUEUE_CAPACITY,
        }
    }
}
