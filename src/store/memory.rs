// src/store/memory.rs

//! In-memory stores, used by tests and by embedders without a database.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::debug;

use super::{NodeStore, ValueStore};
use crate::dag::value::payload_digest;
use crate::dag::{NewValue, Node, NodeGraph, Value};
use crate::errors::{NodeflowError, Result};
use crate::types::{NodeId, ValueId};

/// [`NodeStore`] over a lock-protected [`NodeGraph`].
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    graph: RwLock<NodeGraph>,
}

impl MemoryNodeStore {
    pub fn new(graph: NodeGraph) -> Self {
        Self {
            graph: RwLock::new(graph),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, NodeGraph> {
        self.graph.read()
    }

    /// Apply an edit under the write lock.
    pub fn edit<R>(&self, f: impl FnOnce(&mut NodeGraph) -> R) -> R {
        let mut graph = self.graph.write();
        f(&mut graph)
    }
}

impl NodeStore for MemoryNodeStore {
    fn node(&self, id: NodeId) -> Option<Node> {
        self.graph.read().node(id).cloned()
    }

    fn dependents_of(&self, id: NodeId) -> Vec<Node> {
        let graph = self.graph.read();
        graph
            .dependents_of(id)
            .iter()
            .filter_map(|dep| graph.node(*dep).cloned())
            .collect()
    }

    fn depends_on(&self, a: NodeId, b: NodeId) -> bool {
        self.graph.read().depends_on(a, b)
    }
}

#[derive(Debug, Default)]
struct ValueTable {
    values: BTreeMap<ValueId, Value>,
    /// Direct children of each value.
    children: HashMap<ValueId, Vec<ValueId>>,
    next_id: u64,
}

impl ValueTable {
    fn descendants(&self, id: ValueId) -> Vec<ValueId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<ValueId> = self
            .children
            .get(&id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();

        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            order.push(next);
            if let Some(children) = self.children.get(&next) {
                queue.extend(children.iter().copied());
            }
        }

        order
    }
}

/// [`ValueStore`] keeping every value in memory.
#[derive(Debug, Default)]
pub struct MemoryValueStore {
    table: RwLock<ValueTable>,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All values produced by `node`, in id order.
    pub fn values_of(&self, node: NodeId) -> Vec<Value> {
        self.table
            .read()
            .values
            .values()
            .filter(|v| v.node == node)
            .cloned()
            .collect()
    }
}

impl ValueStore for MemoryValueStore {
    fn value(&self, id: ValueId) -> Option<Value> {
        self.table.read().values.get(&id).cloned()
    }

    fn descendants_of(&self, value: ValueId, node: Option<NodeId>) -> Vec<Value> {
        let table = self.table.read();
        table
            .descendants(value)
            .into_iter()
            .filter_map(|id| table.values.get(&id))
            .filter(|v| node.is_none_or(|n| v.node == n))
            .cloned()
            .collect()
    }

    fn derived_values(&self, node: NodeId, sources: &BTreeSet<ValueId>) -> Vec<Value> {
        let table = self.table.read();
        let mut found: Vec<Value> = table
            .values
            .values()
            .filter(|v| v.node == node && v.sources == *sources)
            .cloned()
            .collect();
        found.sort_by_key(|v| v.position);
        found
    }

    fn insert(&self, value: NewValue) -> Result<Value> {
        let mut table = self.table.write();
        if let Some(missing) = value.sources.iter().find(|s| !table.values.contains_key(*s)) {
            return Err(NodeflowError::ValueNotFound(*missing));
        }

        let id = ValueId(table.next_id);
        table.next_id += 1;

        for source in &value.sources {
            table.children.entry(*source).or_default().push(id);
        }

        let stored = Value {
            id,
            node: value.node,
            digest: payload_digest(&value.payload),
            sources: value.sources,
            position: value.position,
            payload: value.payload,
        };
        table.values.insert(id, stored.clone());
        debug!(value = %id, node = %stored.node, "value inserted");
        Ok(stored)
    }

    fn update(&self, id: ValueId, payload: serde_json::Value) -> Result<Value> {
        let mut table = self.table.write();
        let stored = table.values.get_mut(&id).ok_or(NodeflowError::ValueNotFound(id))?;
        stored.digest = payload_digest(&payload);
        stored.payload = payload;
        Ok(stored.clone())
    }

    fn delete(&self, id: ValueId) -> Result<Vec<ValueId>> {
        let mut table = self.table.write();
        if !table.values.contains_key(&id) {
            return Err(NodeflowError::ValueNotFound(id));
        }

        let mut doomed = vec![id];
        doomed.extend(table.descendants(id));

        for victim in &doomed {
            if let Some(value) = table.values.remove(victim) {
                for source in &value.sources {
                    if let Some(children) = table.children.get_mut(source) {
                        children.retain(|c| c != victim);
                    }
                }
            }
            table.children.remove(victim);
        }

        debug!(value = %id, removed = doomed.len(), "value deleted with descendants");
        Ok(doomed)
    }
}
