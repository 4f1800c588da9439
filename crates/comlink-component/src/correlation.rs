use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Random opaque string pairing an outbound request with its inbound
/// return. Unique among an instance's currently-outstanding operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh correlation id.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Adopt a correlation id received from the peer.
    pub fn from_wire(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token naming one local pending operation. Never sent on the
/// wire — it only keys the local pending-operation maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference(u64);

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref-{}", self.0)
    }
}

/// Per-component reference counter.
#[derive(Debug, Default)]
pub(crate) struct ReferenceMinter(AtomicU64);

impl ReferenceMinter {
    pub(crate) fn mint(&self) -> Reference {
        Reference(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
