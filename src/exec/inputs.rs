// src/exec/inputs.rs

//! Picking the source values a node evaluates together.
//!
//! A node consumes one value per source node. Given some context values
//! (what a work item carries, or what an evaluation just consumed and
//! produced), each source node is filled from:
//! 1. a context value produced by that node,
//! 2. an ancestor of the context produced by that node,
//! 3. values of that node derived from the context or its ancestors.
//!
//! The third step is how a join sees a sibling branch computed from the same
//! upstream document.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::dag::{Node, Value};
use crate::exec::evaluator::Inputs;
use crate::store::{NodeStore, ValueStore};
use crate::types::{NodeId, ValueId};

/// Inputs found for one node, plus the source names nothing was found for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub inputs: Inputs,
    pub missing: Vec<String>,
}

impl Resolved {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Ids of the values that would be consumed.
    pub fn consumed(&self) -> BTreeSet<ValueId> {
        self.inputs.values().map(|v| v.id).collect()
    }
}

/// Resolves inputs against the node and value stores.
#[derive(Clone)]
pub struct InputResolver {
    nodes: Arc<dyn NodeStore>,
    values: Arc<dyn ValueStore>,
}

impl std::fmt::Debug for InputResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputResolver").finish_non_exhaustive()
    }
}

impl InputResolver {
    pub fn new(nodes: Arc<dyn NodeStore>, values: Arc<dyn ValueStore>) -> Self {
        Self { nodes, values }
    }

    /// One value per source node of `node`, the newest candidate winning.
    pub fn resolve(&self, node: &Node, context: &BTreeSet<ValueId>) -> Resolved {
        let lineage = self.lineage(context);
        let mut resolved = Resolved::default();

        for (name, candidates) in self.candidates(node, context, &lineage) {
            match candidates.into_iter().max_by_key(|v| v.id) {
                Some(value) => {
                    resolved.inputs.insert(name, value);
                }
                None => resolved.missing.push(name),
            }
        }

        resolved
    }

    /// Every complete combination of source values for `node` reachable from
    /// `context`, as value-id sets. Empty when some source has no candidate.
    pub fn combinations(&self, node: &Node, context: &BTreeSet<ValueId>) -> Vec<BTreeSet<ValueId>> {
        if node.is_root() {
            return Vec::new();
        }
        let lineage = self.lineage(context);

        let mut combos: Vec<BTreeSet<ValueId>> = vec![BTreeSet::new()];
        for (name, candidates) in self.candidates(node, context, &lineage) {
            if candidates.is_empty() {
                trace!(node = %node.name, source = %name, "source not ready; no combination");
                return Vec::new();
            }
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    candidates.iter().map(move |candidate| {
                        let mut next = combo.clone();
                        next.insert(candidate.id);
                        next
                    })
                })
                .collect();
        }
        combos
    }

    /// Candidate values per source node, keyed by source name.
    fn candidates(
        &self,
        node: &Node,
        context: &BTreeSet<ValueId>,
        lineage: &BTreeMap<ValueId, Value>,
    ) -> Vec<(String, Vec<Value>)> {
        let mut out = Vec::with_capacity(node.sources.len());

        for source in &node.sources {
            let Some(source_node) = self.nodes.node(*source) else {
                warn!(node = %node.name, source = %source, "source node vanished");
                continue;
            };

            let from_context: Vec<Value> = context
                .iter()
                .filter_map(|id| lineage.get(id))
                .filter(|v| v.node == *source)
                .cloned()
                .collect();
            let found = if !from_context.is_empty() {
                from_context
            } else {
                let from_ancestors = at_node(lineage.values(), *source);
                if !from_ancestors.is_empty() {
                    from_ancestors
                } else {
                    self.derived_at(lineage, *source)
                }
            };

            out.push((source_node.name, found));
        }

        out
    }

    /// The context values plus all of their ancestors.
    fn lineage(&self, context: &BTreeSet<ValueId>) -> BTreeMap<ValueId, Value> {
        let mut seen = BTreeMap::new();
        let mut stack: Vec<ValueId> = context.iter().copied().collect();

        while let Some(id) = stack.pop() {
            if seen.contains_key(&id) {
                continue;
            }
            let Some(value) = self.values.value(id) else {
                continue;
            };
            stack.extend(value.sources.iter().copied());
            seen.insert(id, value);
        }

        seen
    }

    fn derived_at(&self, lineage: &BTreeMap<ValueId, Value>, source: NodeId) -> Vec<Value> {
        let mut seen = HashSet::new();
        let mut found: Vec<Value> = lineage
            .keys()
            .flat_map(|id| self.values.descendants_of(*id, Some(source)))
            .filter(|v| seen.insert(v.id))
            .collect();
        found.sort_by_key(|v| v.id);
        found
    }
}

fn at_node<'a>(values: impl Iterator<Item = &'a Value>, node: NodeId) -> Vec<Value> {
    values.filter(|v| v.node == node).cloned().collect()
}
