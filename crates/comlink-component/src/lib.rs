//! Call/cast/register/acquire protocol layer and component lifecycle for
//! comlink.
//!
//! A component talks to exactly one peer through a channel. The four
//! protocol intents — **call** (one reply expected), **cast**
//! (fire-and-forget), **register** (join a named group) and **acquire**
//! (request a provisioned resource) — are matched to their asynchronous
//! returns by correlation ids kept in pending-operation maps, all confined
//! to one dispatch thread per component. A plain enumerated state machine
//! (bootstrap → initialize → bind → ready → terminate) governs which
//! operations are legal when.

pub mod component;
pub mod config;
pub mod correlation;
pub mod error;
pub mod lifecycle;
pub mod wire;

mod pending;

pub use component::{
    AcquireReply, CallReply, Component, ComponentHandle, ComponentHandler, InboundCall,
    InboundCast,
};
pub use config::{ComponentConfig, StaleReplyPolicy, DEFAULT_OP_QUEUE_CAPACITY};
pub use correlation::{CorrelationId, Reference};
pub use error::{ComponentError, ProtocolError, Result};
pub use lifecycle::{transition, LifecycleError, State, Trigger};
pub use wire::{AcquireSpec, CallOutcome, SocketDescriptor};
