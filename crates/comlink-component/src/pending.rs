use std::collections::HashMap;

use crate::correlation::{CorrelationId, Reference};
use crate::error::ProtocolError;

/// Bidirectional reference↔correlation map for one kind of pending
/// operation.
///
/// Owned exclusively by the component's dispatch thread — that confinement
/// is the synchronization; there is no lock. An entry is created when the
/// operation starts and removed exactly once when its return arrives.
/// Duplicate insertion and double removal are protocol errors.
#[derive(Debug)]
pub(crate) struct PendingMap {
    label: &'static str,
    by_reference: HashMap<Reference, CorrelationId>,
    by_correlation: HashMap<CorrelationId, Reference>,
}

impl PendingMap {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            by_reference: HashMap::new(),
            by_correlation: HashMap::new(),
        }
    }

    pub(crate) fn insert(
        &mut self,
        reference: Reference,
        correlation: CorrelationId,
    ) -> Result<(), ProtocolError> {
        if self.by_reference.contains_key(&reference) {
            return Err(ProtocolError::DuplicateReference {
                map: self.label,
                reference: reference.to_string(),
            });
        }
        if self.by_correlation.contains_key(&correlation) {
            return Err(ProtocolError::DuplicateCorrelation {
                map: self.label,
                correlation: correlation.to_string(),
            });
        }
        self.by_reference.insert(reference, correlation.clone());
        self.by_correlation.insert(correlation, reference);
        Ok(())
    }

    /// Resolve and remove by the wire-side key. `None` means the return is
    /// stale or unknown.
    pub(crate) fn remove_by_correlation(&mut self, correlation: &CorrelationId) -> Option<Reference> {
        let reference = self.by_correlation.remove(correlation)?;
        self.by_reference.remove(&reference);
        Some(reference)
    }

    /// Resolve and remove by the local key.
    pub(crate) fn remove_by_reference(&mut self, reference: Reference) -> Option<CorrelationId> {
        let correlation = self.by_reference.remove(&reference)?;
        self.by_correlation.remove(&correlation);
        Some(correlation)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_reference.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }
}
