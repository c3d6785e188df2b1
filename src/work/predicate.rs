// src/work/predicate.rs

//! "Must work item A run after work item B?"
//!
//! The relation is recomputed on every scheduling decision. Both the node
//! graph and the value graph change while work runs, so nothing here is
//! cached.

use std::sync::Arc;

use crate::store::{NodeStore, ValueStore};
use crate::work::item::WorkItem;

/// Decides ordering between two work items.
pub trait DependencyPredicate: Send + Sync {
    /// True when `a` must not run before `b` has finished.
    fn depends_on(&self, a: &WorkItem, b: &WorkItem) -> bool;
}

impl<F> DependencyPredicate for F
where
    F: Fn(&WorkItem, &WorkItem) -> bool + Send + Sync,
{
    fn depends_on(&self, a: &WorkItem, b: &WorkItem) -> bool {
        self(a, b)
    }
}

/// Predicate combining value-level and node-level ancestry.
///
/// `a` depends on `b` when either:
/// - one of `a`'s source values descends from one of `b`'s source values, or
/// - `a`'s node depends on `b`'s node and the items are related: they share
///   a source value, `b`'s node is cumulative, or `a` has no sources at all.
///
/// Node ancestry alone is not enough: two items on dependent nodes fed by
/// unrelated values (two different documents, say) run concurrently.
pub struct GraphPredicate {
    nodes: Arc<dyn NodeStore>,
    values: Arc<dyn ValueStore>,
}

impl GraphPredicate {
    pub fn new(nodes: Arc<dyn NodeStore>, values: Arc<dyn ValueStore>) -> Self {
        Self { nodes, values }
    }

    fn values_descend(&self, a: &WorkItem, b: &WorkItem) -> bool {
        a.sources().iter().any(|av| {
            b.sources()
                .iter()
                .any(|bv| av != bv && self.values.descends_from(*av, *bv))
        })
    }

    fn nodes_related(&self, a: &WorkItem, b: &WorkItem) -> bool {
        if !self.nodes.depends_on(a.target(), b.target()) {
            return false;
        }
        a.is_global()
            || a.shares_sources_with(b)
            || self
                .nodes
                .node(b.target())
                .is_some_and(|node| node.cumulative)
    }
}

impl DependencyPredicate for GraphPredicate {
    fn depends_on(&self, a: &WorkItem, b: &WorkItem) -> bool {
        if a.is_duplicate_of(b) {
            return false;
        }
        self.values_descend(a, b) || self.nodes_related(a, b)
    }
}

impl std::fmt::Debug for GraphPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphPredicate").finish_non_exhaustive()
    }
}
