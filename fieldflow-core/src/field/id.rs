//! Identifiers for fields and the nodes that own them.
//!
//! Ids come from process-wide atomic counters and are never reused, so an
//! id that outlives its field is reliably detected as unknown instead of
//! aliasing a newer field.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a field (a reactive cell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u64);

impl FieldId {
    /// Generate a new unique field ID.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

/// Unique identifier for a node owning a group of fields.
///
/// Fields hold a `NodeId` as a back-reference only; nodes are looked up
/// through the graph and never kept alive by their fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_ids_are_unique() {
        let id1 = FieldId::next();
        let id2 = FieldId::next();
        let id3 = FieldId::next();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ids_increase() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert!(b.raw() > a.raw());
        assert_eq!(format!("{}", FieldId(7)), "field#7");
    }
}
