use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use nodeflow::dag::Node;
use nodeflow::exec::{Evaluator, Inputs};
use serde_json::Value;

/// Always returns the same payloads.
pub struct ConstEvaluator {
    outputs: Vec<Value>,
}

impl ConstEvaluator {
    pub fn new(outputs: Vec<Value>) -> Self {
        Self { outputs }
    }
}

impl Evaluator for ConstEvaluator {
    fn evaluate(&self, _node: &Node, _inputs: &Inputs) -> anyhow::Result<Vec<Value>> {
        Ok(self.outputs.clone())
    }
}

/// Returns one output per input, in source-name order, after applying `map`.
pub struct MapEvaluator {
    map: fn(&Value) -> Value,
}

impl MapEvaluator {
    pub fn new(map: fn(&Value) -> Value) -> Self {
        Self { map }
    }

    /// Passes payloads through unchanged.
    pub fn echo() -> Self {
        Self::new(|v| v.clone())
    }

    /// Upper-cases string payloads; other payloads pass through.
    pub fn uppercase() -> Self {
        Self::new(|v| match v.as_str() {
            Some(s) => Value::String(s.to_uppercase()),
            None => v.clone(),
        })
    }
}

impl Evaluator for MapEvaluator {
    fn evaluate(&self, _node: &Node, inputs: &Inputs) -> anyhow::Result<Vec<Value>> {
        Ok(inputs.values().map(|v| (self.map)(&v.payload)).collect())
    }
}

/// Fails the first `failures` calls, then returns `outputs`.
///
/// The call counter is shared so tests can read it after the evaluator has
/// been moved into a registry.
pub struct FailingEvaluator {
    failures: usize,
    outputs: Vec<Value>,
    calls: Arc<AtomicUsize>,
}

impl FailingEvaluator {
    pub fn new(failures: usize, outputs: Vec<Value>) -> Self {
        Self {
            failures,
            outputs,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Never succeeds.
    pub fn always() -> Self {
        Self::new(usize::MAX, vec![])
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Evaluator for FailingEvaluator {
    fn evaluate(&self, node: &Node, _inputs: &Inputs) -> anyhow::Result<Vec<Value>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(anyhow!("{} failed on call {}", node.name, call + 1));
        }
        Ok(self.outputs.clone())
    }
}

/// Panics on every call.
pub struct PanickingEvaluator;

impl Evaluator for PanickingEvaluator {
    fn evaluate(&self, node: &Node, _inputs: &Inputs) -> anyhow::Result<Vec<Value>> {
        panic!("evaluator for {} exploded", node.name);
    }
}

/// One recorded evaluation.
#[derive(Debug, Clone)]
pub struct Call {
    pub node: String,
    pub inputs: Inputs,
}

/// Wraps another evaluator and records each call in order.
pub struct RecordingEvaluator<E> {
    inner: E,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl<E: Evaluator> RecordingEvaluator<E> {
    pub fn new(inner: E, calls: Arc<Mutex<Vec<Call>>>) -> Self {
        Self {
            inner,
            delay: None,
            calls,
        }
    }

    /// Sleep for `delay` before evaluating, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl<E: Evaluator> Evaluator for RecordingEvaluator<E> {
    fn evaluate(&self, node: &Node, inputs: &Inputs) -> anyhow::Result<Vec<Value>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        {
            let mut guard = self.calls.lock().unwrap();
            guard.push(Call {
                node: node.name.clone(),
                inputs: inputs.clone(),
            });
        }
        self.inner.evaluate(node, inputs)
    }
}

/// Node names from `calls`, in call order.
pub fn called_nodes(calls: &Arc<Mutex<Vec<Call>>>) -> Vec<String> {
    calls
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.node.clone())
        .collect()
}
