// src/store/mod.rs

//! Storage interfaces consumed by the scheduler and runner.
//!
//! The engine never owns durable storage. It talks to a [`NodeStore`] and a
//! [`ValueStore`], which production code backs with a database and tests
//! back with the in-memory implementations in [`memory`].

use std::collections::BTreeSet;

use crate::dag::{NewValue, Node, Value, ValuePath};
use crate::errors::Result;
use crate::types::{NodeId, ValueId};

pub mod memory;

pub use memory::{MemoryNodeStore, MemoryValueStore};

/// Read access to the node DAG.
pub trait NodeStore: Send + Sync {
    fn node(&self, id: NodeId) -> Option<Node>;

    /// Direct dependents only.
    fn dependents_of(&self, id: NodeId) -> Vec<Node>;

    /// Transitive ancestry test: does `a` depend on `b`?
    fn depends_on(&self, a: NodeId, b: NodeId) -> bool;
}

/// Access to stored values and their ancestry.
pub trait ValueStore: Send + Sync {
    fn value(&self, id: ValueId) -> Option<Value>;

    /// Transitive descendants of `value`, restricted to values produced by
    /// `node` when one is given.
    fn descendants_of(&self, value: ValueId, node: Option<NodeId>) -> Vec<Value>;

    /// Values currently stored for `node` derived from exactly `sources`,
    /// ordered by position.
    fn derived_values(&self, node: NodeId, sources: &BTreeSet<ValueId>) -> Vec<Value>;

    fn insert(&self, value: NewValue) -> Result<Value>;

    fn update(&self, id: ValueId, payload: serde_json::Value) -> Result<Value>;

    /// Delete a value and everything derived from it. Returns removed ids.
    fn delete(&self, id: ValueId) -> Result<Vec<ValueId>>;

    fn path_of(&self, value: &Value) -> ValuePath {
        ValuePath::of(value)
    }

    /// Whether `value` transitively descends from `ancestor`.
    fn descends_from(&self, value: ValueId, ancestor: ValueId) -> bool {
        if value == ancestor {
            return false;
        }
        let Some(target) = self.value(value) else {
            return false;
        };
        self.descendants_of(ancestor, Some(target.node))
            .iter()
            .any(|v| v.id == value)
    }
}
