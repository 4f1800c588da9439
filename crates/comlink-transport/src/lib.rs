//! Byte-stream endpoints and readiness multiplexing for comlink.
//!
//! The engine is transport-agnostic: anything that reads and writes bytes,
//! supports non-blocking mode, and can be polled for readiness works as one
//! side of a channel. This crate wraps the concrete kinds (Unix sockets, TCP
//! sockets, pipes/stdio) behind [`Endpoint`] and provides the [`Poller`] the
//! io stage parks on.

pub mod endpoint;
pub mod error;
pub mod poller;
pub mod uds;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use poller::{Interest, Poller, Readiness, WakeHandle};
pub use uds::UnixDomainSocket;
