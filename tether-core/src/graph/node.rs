//! Graph Nodes
//!
//! This module defines the two node roles that live in the dependency graph.
//! A computed value owns one node of each role.

use serde::Serialize;

use super::link::LinkId;

/// Identifier of a source node (something that can be read reactively).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SourceId(usize);

impl SourceId {
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Get the raw slot index.
    pub fn raw(&self) -> usize {
        self.0
    }
}

/// Identifier of a subscriber node (something that re-runs on change).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubId(usize);

impl SubId {
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Get the raw slot index.
    pub fn raw(&self) -> usize {
        self.0
    }
}

/// How propagation treats a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubKind {
    /// A leaf with side effects. Collected during a walk, notified after it.
    Effect,

    /// A computed value. Recomputed inline during a walk; the source id is
    /// its own source role, used to continue the walk when its value changed.
    Derived(SourceId),
}

/// The source role: head and tail of the subscriber list.
#[derive(Debug, Default)]
pub(crate) struct SourceNode {
    pub subs_head: Option<LinkId>,
    pub subs_tail: Option<LinkId>,
}

/// The subscriber role: head and tail of the dependency list plus run state.
#[derive(Debug)]
pub(crate) struct SubNode {
    pub deps_head: Option<LinkId>,
    /// Last dependency confirmed by the current (or last) tracking pass.
    pub deps_tail: Option<LinkId>,
    /// True while the subscriber body is executing.
    pub tracking: bool,
    /// True when an upstream change has not been acted on yet.
    pub dirty: bool,
    pub kind: SubKind,
}

impl SubNode {
    pub fn new(kind: SubKind) -> Self {
        Self {
            deps_head: None,
            deps_tail: None,
            tracking: false,
            // Computed values start unevaluated
            dirty: matches!(kind, SubKind::Derived(_)),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_node_starts_dirty() {
        let node = SubNode::new(SubKind::Derived(SourceId::from_raw(0)));
        assert!(node.dirty);
        assert!(!node.tracking);
    }

    #[test]
    fn effect_node_starts_clean() {
        let node = SubNode::new(SubKind::Effect);
        assert!(!node.dirty);
        assert!(node.deps_head.is_none());
        assert!(node.deps_tail.is_none());
    }

    #[test]
    fn ids_serialize_as_slot_indices() {
        let ids = (SourceId::from_raw(3), SubId::from_raw(7));
        assert_eq!(serde_json::to_string(&ids).expect("ids serialize"), "[3,7]");
    }
}
