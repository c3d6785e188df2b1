// src/dag/value.rs

//! Values: concrete results produced by a node from one combination of
//! source values. Values form a second DAG mirroring part of the node DAG.

use std::collections::BTreeSet;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::types::{NodeId, ValueId};

/// A stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub id: ValueId,
    /// Node that produced this value.
    pub node: NodeId,
    /// Values this one was derived from. Empty for ingested root values.
    pub sources: BTreeSet<ValueId>,
    /// Index of this value in the evaluator's output for its source set.
    pub position: usize,
    pub payload: serde_json::Value,
    /// blake3 digest of `payload`, used to detect unchanged outputs.
    pub digest: String,
}

impl Value {
    pub fn is_root(&self) -> bool {
        self.sources.is_empty()
    }
}

/// A value about to be inserted into a [`crate::store::ValueStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewValue {
    pub node: NodeId,
    pub sources: BTreeSet<ValueId>,
    pub position: usize,
    pub payload: serde_json::Value,
}

impl NewValue {
    /// A root value carrying ingested data.
    pub fn root(node: NodeId, payload: serde_json::Value) -> Self {
        Self {
            node,
            sources: BTreeSet::new(),
            position: 0,
            payload,
        }
    }

    pub fn path(&self) -> ValuePath {
        ValuePath {
            node: self.node,
            sources: self.sources.iter().copied().collect(),
            position: self.position,
        }
    }
}

/// Positional identity of a value: which node produced it, from which
/// source values, at which output index.
///
/// Re-evaluating a node for the same sources yields candidates with the same
/// paths, which is how stored values are matched against new output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValuePath {
    pub node: NodeId,
    pub sources: Vec<ValueId>,
    pub position: usize,
}

impl ValuePath {
    pub fn of(value: &Value) -> Self {
        Self {
            node: value.node,
            sources: value.sources.iter().copied().collect(),
            position: value.position,
        }
    }
}

/// Compute the content digest of a payload.
pub fn payload_digest(payload: &serde_json::Value) -> String {
    let mut hasher = Hasher::new();
    hasher.update(payload.to_string().as_bytes());
    hasher.finalize().to_hex().to_string()
}
