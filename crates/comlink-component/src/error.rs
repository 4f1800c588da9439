use crate::lifecycle::LifecycleError;

/// Errors that can occur in component operations.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// An operation was attempted in a state where it is not legal.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Protocol-level violation, scoped to one exchange.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Channel-level failure.
    #[error("channel error: {0}")]
    Channel(#[from] comlink_channel::ChannelError),

    /// The component's operation queue is full.
    #[error("operation queue full ({capacity} operations)")]
    Busy { capacity: usize },

    /// The dispatch worker is not running.
    #[error("component is not running")]
    NotRunning,
}

/// Violations of the exchange protocol. These never terminate the channel;
/// they are traced and scoped to the one exchange involved.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A correlation id was inserted twice into the same pending map.
    #[error("duplicate correlation id {correlation} in {map} map")]
    DuplicateCorrelation {
        map: &'static str,
        correlation: String,
    },

    /// A reference was inserted twice into the same pending map.
    #[error("duplicate reference {reference} in {map} map")]
    DuplicateReference {
        map: &'static str,
        reference: String,
    },

    /// A call return was issued for a reference with no pending inbound
    /// call (already answered, or never received).
    #[error("no pending inbound call for reference {reference}")]
    UnknownReference { reference: String },

    /// A message lacks a required metadata key.
    #[error("message missing metadata key \"{key}\"")]
    MissingKey { key: &'static str },

    /// A metadata key holds a value of an unexpected type.
    #[error("metadata key \"{key}\" has an unexpected type")]
    InvalidKey { key: &'static str },
}

pub type Result<T> = std::result::Result<T, ComponentError>;
