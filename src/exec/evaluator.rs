// src/exec/evaluator.rs

//! Pluggable evaluation logic, one [`Evaluator`] per node kind.
//!
//! The runner never switches on kind strings. It looks the node's kind up
//! in an [`EvaluatorRegistry`] once per work item and calls whatever was
//! registered. Production code registers expression/query/extraction
//! evaluators; tests register closures.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::dag::{Node, Value};
use crate::types::NodeKind;

/// Resolved inputs for one evaluation, keyed by source node name.
pub type Inputs = BTreeMap<String, Value>;

/// Turns source values into derived payloads for one node.
///
/// The position of each payload in the returned vector is its positional
/// identity: re-evaluating with the same sources should return matching
/// outputs at matching positions so unchanged results are recognised.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, node: &Node, inputs: &Inputs) -> anyhow::Result<Vec<serde_json::Value>>;
}

impl<F> Evaluator for F
where
    F: Fn(&Node, &Inputs) -> anyhow::Result<Vec<serde_json::Value>> + Send + Sync,
{
    fn evaluate(&self, node: &Node, inputs: &Inputs) -> anyhow::Result<Vec<serde_json::Value>> {
        self(node, inputs)
    }
}

/// Evaluators keyed by node kind.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<NodeKind, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `evaluator` for `kind`, returning the one it replaced.
    pub fn register(
        &mut self,
        kind: impl Into<NodeKind>,
        evaluator: impl Evaluator + 'static,
    ) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.insert(kind.into(), Arc::new(evaluator))
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: impl Into<NodeKind>, evaluator: impl Evaluator + 'static) -> Self {
        self.register(kind, evaluator);
        self
    }

    pub fn get(&self, kind: &NodeKind) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(kind).cloned()
    }

    pub fn contains(&self, kind: &NodeKind) -> bool {
        self.evaluators.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &NodeKind> {
        self.evaluators.keys()
    }
}

impl fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.evaluators.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("EvaluatorRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}
