// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::dag::node::{validate_name, Node, NodeSpec};
use crate::dag::sort::{is_circular, sort};
use crate::errors::{NodeflowError, Result};
use crate::types::NodeId;

/// Internal node structure: the accepted node plus its direct dependents.
#[derive(Debug, Clone)]
struct DagNode {
    node: Node,
    /// Direct dependents: nodes that list this one in their sources.
    dependents: Vec<NodeId>,
}

/// In-memory DAG of declared nodes keyed by [`NodeId`].
///
/// Every edit is validated before it is applied: names must be valid and
/// unique, sources must exist, and an edit that would introduce a cycle is
/// rejected with [`NodeflowError::DagCycle`]. After each edit the affected
/// source lists are re-sorted into dependency order.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    nodes: BTreeMap<NodeId, DagNode>,
    names: HashMap<String, NodeId>,
    next_id: u64,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Accept a new node and return its identity.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<NodeId> {
        validate_name(&spec.name)?;
        if self.names.contains_key(&spec.name) {
            return Err(NodeflowError::DuplicateName(spec.name));
        }
        let sources = self.checked_sources(&spec.name, spec.sources)?;

        let id = NodeId(self.next_id);
        if self.would_cycle(id, &sources) {
            return Err(NodeflowError::DagCycle(format!(
                "node '{}' would depend on itself",
                spec.name
            )));
        }
        self.next_id += 1;

        for source in &sources {
            if let Some(entry) = self.nodes.get_mut(source) {
                entry.dependents.push(id);
            }
        }

        let sources = self.sort_sources(sources);
        debug!(node = %id, name = %spec.name, ?sources, "node accepted");

        self.names.insert(spec.name.clone(), id);
        self.nodes.insert(
            id,
            DagNode {
                node: Node {
                    id,
                    name: spec.name,
                    kind: spec.kind,
                    sources,
                    cumulative: spec.cumulative,
                },
                dependents: Vec::new(),
            },
        );

        Ok(id)
    }

    /// Replace the sources of an existing node.
    ///
    /// Rejected without any change if the new source list would make the
    /// graph cyclic.
    pub fn set_sources(&mut self, id: NodeId, sources: Vec<NodeId>) -> Result<()> {
        let name = self.node(id).ok_or(NodeflowError::NodeNotFound(id))?.name.clone();
        let sources = self.checked_sources(&name, sources)?;

        if self.would_cycle(id, &sources) {
            return Err(NodeflowError::DagCycle(format!(
                "setting sources of '{}' would create a cycle",
                name
            )));
        }

        let old = self
            .nodes
            .get(&id)
            .map(|entry| entry.node.sources.clone())
            .unwrap_or_default();
        for source in old {
            if let Some(entry) = self.nodes.get_mut(&source) {
                entry.dependents.retain(|d| *d != id);
            }
        }
        for source in &sources {
            if let Some(entry) = self.nodes.get_mut(source) {
                entry.dependents.push(id);
            }
        }
        if let Some(entry) = self.nodes.get_mut(&id) {
            entry.node.sources = sources;
        }

        // Ancestry changed, so any source list may now be out of order.
        self.resort_all_sources();
        debug!(node = %id, name = %name, "node sources updated");
        Ok(())
    }

    /// Give a node a new, unique, valid name.
    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        validate_name(&name)?;
        match self.names.get(&name) {
            Some(existing) if *existing == id => return Ok(()),
            Some(_) => return Err(NodeflowError::DuplicateName(name)),
            None => {}
        }

        let entry = self.nodes.get_mut(&id).ok_or(NodeflowError::NodeNotFound(id))?;
        let old = std::mem::replace(&mut entry.node.name, name.clone());
        self.names.remove(&old);
        self.names.insert(name, id);
        Ok(())
    }

    pub fn set_cumulative(&mut self, id: NodeId, cumulative: bool) -> Result<()> {
        let entry = self.nodes.get_mut(&id).ok_or(NodeflowError::NodeNotFound(id))?;
        entry.node.cumulative = cumulative;
        Ok(())
    }

    /// Delete a node and every node that transitively depends on it.
    ///
    /// Ancestors are never touched beyond forgetting the removed dependents.
    /// Returns the removed nodes, the requested one first.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Vec<Node>> {
        if !self.nodes.contains_key(&id) {
            return Err(NodeflowError::NodeNotFound(id));
        }

        let mut doomed = vec![id];
        doomed.extend(self.descendants_of(id));
        let doomed_set: HashSet<NodeId> = doomed.iter().copied().collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for victim in doomed {
            if let Some(entry) = self.nodes.remove(&victim) {
                self.names.remove(&entry.node.name);
                for source in &entry.node.sources {
                    if doomed_set.contains(source) {
                        continue;
                    }
                    if let Some(parent) = self.nodes.get_mut(source) {
                        parent.dependents.retain(|d| *d != victim);
                    }
                }
                removed.push(entry.node);
            }
        }

        info!(node = %id, removed = removed.len(), "node removed with its dependents");
        Ok(removed)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id).map(|entry| &entry.node)
    }

    pub fn by_name(&self, name: &str) -> Option<&Node> {
        self.names.get(name).and_then(|id| self.node(*id))
    }

    /// All nodes in identity order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().map(|entry| &entry.node)
    }

    /// Nodes without sources.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|node| node.is_root())
    }

    /// Immediate sources of a node, in dependency order.
    pub fn dependencies_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|entry| entry.node.sources.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|entry| entry.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `a` transitively depends on `b`. Never true for `a == b`.
    pub fn depends_on(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        self.walk(a, |id| self.dependencies_of(id)).contains(&b)
    }

    /// Transitive sources of a node, nearest first.
    pub fn ancestors_of(&self, id: NodeId) -> Vec<NodeId> {
        self.walk(id, |n| self.dependencies_of(n))
    }

    /// Transitive dependents of a node, nearest first.
    pub fn descendants_of(&self, id: NodeId) -> Vec<NodeId> {
        self.walk(id, |n| self.dependents_of(n))
    }

    /// Whether the node can reach itself through its sources.
    pub fn is_circular(&self, id: NodeId) -> bool {
        is_circular(&id, |n| self.dependencies_of(*n).to_vec())
    }

    /// Every node id in a valid evaluation order.
    pub fn evaluation_order(&self) -> Vec<NodeId> {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        sort(ids, |n| self.dependencies_of(*n).to_vec())
    }

    fn checked_sources(&self, name: &str, sources: Vec<NodeId>) -> Result<Vec<NodeId>> {
        let mut seen = HashSet::new();
        let mut checked = Vec::with_capacity(sources.len());
        for source in sources {
            if !self.nodes.contains_key(&source) {
                return Err(NodeflowError::UnknownSource {
                    node: name.to_string(),
                    source_id: source,
                });
            }
            if seen.insert(source) {
                checked.push(source);
            }
        }
        Ok(checked)
    }

    /// Validation gate: would `id` be circular with `sources` as its sources?
    fn would_cycle(&self, id: NodeId, sources: &[NodeId]) -> bool {
        is_circular(&id, |n| {
            if *n == id {
                sources.to_vec()
            } else {
                self.dependencies_of(*n).to_vec()
            }
        })
    }

    fn sort_sources(&self, sources: Vec<NodeId>) -> Vec<NodeId> {
        sort(sources, |n| self.ancestors_of(*n))
    }

    fn resort_all_sources(&mut self) {
        let resorted: Vec<(NodeId, Vec<NodeId>)> = self
            .nodes
            .values()
            .filter(|entry| entry.node.sources.len() > 1)
            .map(|entry| (entry.node.id, self.sort_sources(entry.node.sources.clone())))
            .collect();

        for (id, sources) in resorted {
            if let Some(entry) = self.nodes.get_mut(&id) {
                entry.node.sources = sources;
            }
        }
    }

    fn walk<'a, F>(&'a self, start: NodeId, next: F) -> Vec<NodeId>
    where
        F: Fn(NodeId) -> &'a [NodeId],
    {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<NodeId> = next(start).iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            queue.extend(next(id).iter().copied());
        }

        order
    }
}
