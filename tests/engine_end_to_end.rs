// tests/engine_end_to_end.rs

mod common;
use crate::common::builders::{memory_stores, ConfigFileBuilder, NodeConfigBuilder};
use crate::common::fake_evaluator::{
    called_nodes, Call, ConstEvaluator, FailingEvaluator, MapEvaluator, RecordingEvaluator,
};
use crate::common::{init_tracing, wait_drained, with_timeout};

use std::collections::BTreeSet;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use nodeflow::config::ConfigFile;
use nodeflow::dag::Node;
use nodeflow::errors::NodeflowError;
use nodeflow::exec::{EvaluatorRegistry, RunnerEvent};
use nodeflow::store::{MemoryNodeStore, MemoryValueStore, NodeStore, ValueStore};
use nodeflow::types::NodeId;
use nodeflow::work::WorkItem;
use nodeflow::{Engine, EngineSettings};

type TestResult = Result<(), Box<dyn Error>>;

/// raw -> A -> B
fn chain_config(workers: usize) -> ConfigFile {
    ConfigFileBuilder::new()
        .workers(workers)
        .retry_limit(1)
        .with_root("raw")
        .with_node("A", NodeConfigBuilder::new("echo").source("raw").build())
        .with_node("B", NodeConfigBuilder::new("echo").source("A").build())
        .build()
}

fn settings(workers: usize, retry_limit: u32) -> EngineSettings {
    EngineSettings {
        workers,
        retry_limit,
        idle_timeout: Duration::from_secs(5),
    }
}

struct Started {
    engine: Engine,
    values: Arc<MemoryValueStore>,
    calls: Arc<Mutex<Vec<Call>>>,
    ids: (NodeId, NodeId, NodeId),
}

fn start_chain(workers: usize) -> Result<Started, NodeflowError> {
    let cfg = chain_config(workers);
    let (nodes, values) = memory_stores(&cfg);
    let ids = {
        let graph = nodes.read();
        let id = |name: &str| graph.by_name(name).map(|n| n.id).unwrap();
        (id("raw"), id("A"), id("B"))
    };

    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = EvaluatorRegistry::new().with(
        "echo",
        RecordingEvaluator::new(MapEvaluator::echo(), Arc::clone(&calls))
            .with_delay(Duration::from_millis(5)),
    );

    let engine = Engine::start(
        EngineSettings::from_section(&cfg.engine)?,
        nodes,
        values.clone(),
        registry,
    )?;
    Ok(Started {
        engine,
        values,
        calls,
        ids,
    })
}

#[tokio::test]
async fn ingested_value_flows_through_the_chain() -> TestResult {
    init_tracing();
    let Started {
        mut engine,
        values,
        calls,
        ids: (raw, a, b),
    } = start_chain(4)?;
    let mut events = engine.take_events().expect("events are available once");
    assert!(engine.take_events().is_none());

    let doc = engine.ingest(raw, json!("hello"))?;
    assert!(with_timeout(engine.quiesce(Duration::from_secs(5))).await?);

    assert_eq!(called_nodes(&calls), vec!["A", "B"]);
    assert!(engine.scheduler().is_empty());

    let a_values = values.values_of(a);
    let b_values = values.values_of(b);
    assert_eq!(a_values.len(), 1);
    assert_eq!(b_values.len(), 1);
    assert_eq!(b_values[0].payload, json!("hello"));
    assert!(values.descends_from(b_values[0].id, doc.id));

    let mut completed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RunnerEvent::Completed { item, .. } = event {
            completed.push(item.target());
        }
    }
    assert_eq!(completed, vec![a, b]);

    let leftover = engine.shutdown();
    assert!(leftover.is_empty());
    Ok(())
}

#[tokio::test]
async fn independent_documents_all_finish() -> TestResult {
    init_tracing();
    let Started {
        engine,
        values,
        calls,
        ids: (raw, a, b),
    } = start_chain(4)?;

    for i in 0..10 {
        engine.ingest(raw, json!(format!("doc-{i}")))?;
    }
    assert!(with_timeout(engine.quiesce(Duration::from_secs(5))).await?);

    assert_eq!(values.values_of(a).len(), 10);
    assert_eq!(values.values_of(b).len(), 10);
    assert_eq!(calls.lock().unwrap().len(), 20);

    // For each document, A ran before B.
    let recorded = calls.lock().unwrap().clone();
    for i in 0..10 {
        let payload = json!(format!("doc-{i}"));
        let pos = |node: &str| {
            recorded
                .iter()
                .position(|c| c.node == node && c.inputs.values().any(|v| v.payload == payload))
                .unwrap()
        };
        assert!(pos("A") < pos("B"), "doc-{i}: A must run before B");
    }
    engine.shutdown();
    Ok(())
}

#[test]
fn ingest_rejects_non_root_and_unknown_nodes() -> TestResult {
    let Started {
        engine,
        ids: (_, a, _),
        ..
    } = start_chain(1)?;

    assert!(matches!(
        engine.ingest(a, json!(1)),
        Err(NodeflowError::NotARoot(id)) if id == a
    ));
    assert!(matches!(
        engine.ingest(NodeId(77), json!(1)),
        Err(NodeflowError::NodeNotFound(_))
    ));
    assert!(matches!(
        engine.trigger(NodeId(77)),
        Err(NodeflowError::NodeNotFound(_))
    ));
    engine.shutdown();
    Ok(())
}

#[test]
fn update_root_reruns_dependents_and_updates_in_place() -> TestResult {
    let Started {
        engine,
        values,
        ids: (raw, _, b),
        ..
    } = start_chain(2)?;

    let doc = engine.ingest(raw, json!("v1"))?;
    wait_drained(engine.scheduler());
    let before = values.values_of(b);

    engine.update_root(doc.id, json!("v2"))?;
    wait_drained(engine.scheduler());
    let after = values.values_of(b);

    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 1);
    assert_eq!(before[0].id, after[0].id, "updated in place, not re-inserted");
    assert_eq!(after[0].payload, json!("v2"));
    engine.shutdown();
    Ok(())
}

#[test]
fn retract_removes_derived_values() -> TestResult {
    let Started {
        engine,
        values,
        ids: (raw, _, _),
        ..
    } = start_chain(2)?;

    let keep = engine.ingest(raw, json!("keep"))?;
    let doomed = engine.ingest(raw, json!("drop"))?;
    wait_drained(engine.scheduler());
    assert_eq!(values.len(), 6);

    let removed = engine.retract(doomed.id)?;
    assert_eq!(removed.len(), 3);
    assert_eq!(values.len(), 3);
    assert!(values.value(keep.id).is_some());
    engine.shutdown();
    Ok(())
}

#[test]
fn trigger_runs_a_global_item() -> TestResult {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = EvaluatorRegistry::new()
        .with(
            "report",
            RecordingEvaluator::new(ConstEvaluator::new(vec![json!("ran")]), Arc::clone(&calls)),
        )
        .with("echo", MapEvaluator::echo());
    let cfg = ConfigFileBuilder::new()
        .workers(1)
        .with_root("raw")
        .with_node("report", NodeConfigBuilder::new("report").build())
        .build();

    let engine = Engine::in_memory(&cfg, registry)?;
    let report = engine.nodes().node(NodeId(1)).map(|n| n.name);
    assert_eq!(report.as_deref(), Some("report"));

    assert!(engine.trigger(NodeId(1))?);
    assert!(engine.run_to_idle());
    assert_eq!(called_nodes(&calls), vec!["report"]);
    engine.shutdown();
    Ok(())
}

#[test]
fn failing_node_does_not_stall_the_engine() -> TestResult {
    init_tracing();
    let cfg = chain_config(2);
    let (nodes, values) = memory_stores(&cfg);
    let raw = nodes.read().by_name("raw").map(|n| n.id).unwrap();
    let failing = FailingEvaluator::always();
    let attempts = failing.calls();
    let registry = EvaluatorRegistry::new().with("echo", failing);

    let mut engine = Engine::start(settings(2, 2), nodes, values.clone(), registry)?;
    let mut events = engine.take_events().unwrap();

    engine.ingest(raw, json!("x"))?;
    assert!(engine.wait_idle(Duration::from_secs(5)));

    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    let mut dropped = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RunnerEvent::Dropped { .. }) {
            dropped += 1;
        }
    }
    assert_eq!(dropped, 1);
    assert_eq!(values.len(), 1, "only the root value exists");
    engine.shutdown();
    Ok(())
}

#[test]
fn zero_workers_is_a_config_error() {
    let cfg = chain_config(1);
    let (nodes, values) = memory_stores(&cfg);
    let result = Engine::start(settings(0, 0), nodes, values, EvaluatorRegistry::new());
    assert!(matches!(result, Err(NodeflowError::ConfigError(_))));
}

#[tokio::test]
async fn fan_in_runs_once_per_document_with_many_workers() -> TestResult {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .workers(4)
        .with_root("raw")
        .with_node("A", NodeConfigBuilder::new("echo").source("raw").build())
        .with_node("B", NodeConfigBuilder::new("echo").source("raw").build())
        .with_node(
            "C",
            NodeConfigBuilder::new("join").source("A").source("B").build(),
        )
        .build();
    let (nodes, values) = memory_stores(&cfg);
    let id = |name: &str| nodes.read().by_name(name).map(|n| n.id).unwrap();
    let (raw, a, b, c) = (id("raw"), id("A"), id("B"), id("C"));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = EvaluatorRegistry::new()
        .with("echo", MapEvaluator::echo())
        .with(
            "join",
            RecordingEvaluator::new(ConstEvaluator::new(vec![json!("joined")]), Arc::clone(&calls)),
        );
    let engine = Engine::start(settings(4, 0), nodes.clone(), values.clone(), registry)?;

    for i in 0..5 {
        engine.ingest(raw, json!(format!("doc-{i}")))?;
    }
    assert!(with_timeout(engine.quiesce(Duration::from_secs(5))).await?);

    assert_eq!(called_nodes(&calls).len(), 5, "one join per document");
    let joined = values.values_of(c);
    assert_eq!(joined.len(), 5);
    for value in &joined {
        let inputs: Vec<NodeId> = value
            .sources
            .iter()
            .filter_map(|id| values.value(*id))
            .map(|v| v.node)
            .collect();
        assert_eq!(
            inputs.into_iter().collect::<BTreeSet<_>>(),
            BTreeSet::from([a, b])
        );
    }
    engine.shutdown();
    Ok(())
}

/// Node store that panics when asked for one particular node.
struct PanickyNodes {
    inner: Arc<MemoryNodeStore>,
    broken: NodeId,
}

impl NodeStore for PanickyNodes {
    fn node(&self, id: NodeId) -> Option<Node> {
        if id == self.broken {
            panic!("lookup of {id} blew up");
        }
        self.inner.node(id)
    }

    fn dependents_of(&self, id: NodeId) -> Vec<Node> {
        self.inner.dependents_of(id)
    }

    fn depends_on(&self, a: NodeId, b: NodeId) -> bool {
        self.inner.depends_on(a, b)
    }
}

#[test]
fn worker_survives_a_panicking_store() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .workers(1)
        .with_node("broken", NodeConfigBuilder::new("report").build())
        .with_node("report", NodeConfigBuilder::new("report").build())
        .build();
    let (nodes, values) = memory_stores(&cfg);
    let broken = nodes.read().by_name("broken").map(|n| n.id).unwrap();
    let report = nodes.read().by_name("report").map(|n| n.id).unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = EvaluatorRegistry::new().with(
        "report",
        RecordingEvaluator::new(ConstEvaluator::new(vec![json!("ran")]), Arc::clone(&calls)),
    );
    let store = Arc::new(PanickyNodes {
        inner: nodes,
        broken,
    });
    let engine = Engine::start(settings(1, 0), store, values, registry)?;

    assert!(engine.scheduler().submit(WorkItem::global(broken)));
    assert!(engine.trigger(report)?);
    assert!(engine.wait_idle(Duration::from_secs(5)), "the only worker must keep going");
    assert_eq!(called_nodes(&calls), vec!["report"]);
    engine.shutdown();
    Ok(())
}
