// src/dag/node.rs

//! Node shapes: the accepted [`Node`] and the [`NodeSpec`] used to declare one.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{NodeflowError, Result};
use crate::types::{NodeId, NodeKind};

static NODE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]{0,127}$").expect("node name pattern is valid")
});

/// A named computation step.
///
/// `sources` is kept in dependency order by [`crate::dag::NodeGraph`], so
/// iterating it front to back is always a valid evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub sources: Vec<NodeId>,
    /// Work items on dependents of a cumulative node serialize behind it
    /// even when their input values are unrelated.
    #[serde(default)]
    pub cumulative: bool,
}

impl Node {
    /// Root nodes have no sources and receive ingested values.
    pub fn is_root(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Declaration of a node that has not been accepted into a graph yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKind,
    pub sources: Vec<NodeId>,
    pub cumulative: bool,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            sources: Vec::new(),
            cumulative: false,
        }
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = NodeId>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn cumulative(mut self, cumulative: bool) -> Self {
        self.cumulative = cumulative;
        self
    }
}

/// Check a node name against the naming rule.
///
/// Names start with an ASCII letter, continue with letters, digits, `_`,
/// `.` or `-`, and are at most 128 characters long.
pub fn validate_name(name: &str) -> Result<()> {
    if NODE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(NodeflowError::InvalidName(name.to_string()))
    }
}
