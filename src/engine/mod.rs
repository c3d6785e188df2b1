// src/engine/mod.rs

//! Engine facade for nodeflow.
//!
//! This module ties together:
//! - the node and value stores
//! - the [`WorkScheduler`] with a [`GraphPredicate`] over those stores
//! - a [`Runner`] reporting [`RunnerEvent`]s
//! - the [`WorkerPool`] draining the scheduler
//!
//! Callers feed root values in with [`Engine::ingest`] and wait for the
//! cascade with [`Engine::wait_idle`] or [`Engine::quiesce`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{ConfigFile, EngineSection};
use crate::dag::{NewValue, Node, Value};
use crate::errors::{NodeflowError, Result};
use crate::exec::{EvaluatorRegistry, InputResolver, Runner, RunnerEvent, WorkerPool};
use crate::store::{MemoryNodeStore, MemoryValueStore, NodeStore, ValueStore};
use crate::types::{NodeId, ValueId};
use crate::work::{GraphPredicate, WorkItem, WorkScheduler};

/// Runtime knobs, usually taken from the `[engine]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub workers: usize,
    pub retry_limit: u32,
    pub idle_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            retry_limit: 3,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineSettings {
    pub fn from_section(section: &EngineSection) -> Result<Self> {
        Ok(Self {
            workers: section.workers,
            retry_limit: section.retry_limit,
            idle_timeout: section.idle_timeout()?,
        })
    }
}

/// A running computation engine.
///
/// Dropping the engine closes the scheduler and joins the workers, same as
/// [`shutdown`](Self::shutdown).
pub struct Engine {
    nodes: Arc<dyn NodeStore>,
    values: Arc<dyn ValueStore>,
    scheduler: Arc<WorkScheduler>,
    resolver: InputResolver,
    pool: WorkerPool,
    events: Option<mpsc::UnboundedReceiver<RunnerEvent>>,
    settings: EngineSettings,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("scheduler", &self.scheduler)
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Wire the stores, scheduler, runner and worker pool, and start the
    /// workers.
    pub fn start(
        settings: EngineSettings,
        nodes: Arc<dyn NodeStore>,
        values: Arc<dyn ValueStore>,
        evaluators: EvaluatorRegistry,
    ) -> Result<Self> {
        if settings.workers == 0 {
            return Err(NodeflowError::ConfigError(
                "engine needs at least one worker".to_string(),
            ));
        }

        let predicate = GraphPredicate::new(Arc::clone(&nodes), Arc::clone(&values));
        let scheduler = Arc::new(WorkScheduler::new(Arc::new(predicate)));

        let (tx, rx) = mpsc::unbounded_channel();
        let runner = Runner::new(
            Arc::clone(&nodes),
            Arc::clone(&values),
            evaluators,
            Arc::clone(&scheduler),
            settings.retry_limit,
        )
        .with_events(tx);

        let pool = WorkerPool::spawn(settings.workers, Arc::new(runner))?;
        let resolver = InputResolver::new(Arc::clone(&nodes), Arc::clone(&values));
        info!(
            workers = settings.workers,
            retry_limit = settings.retry_limit,
            "engine started"
        );

        Ok(Self {
            nodes,
            values,
            scheduler,
            resolver,
            pool,
            events: Some(rx),
            settings,
        })
    }

    /// Start an engine over in-memory stores built from a validated config.
    pub fn in_memory(config: &ConfigFile, evaluators: EvaluatorRegistry) -> Result<Self> {
        let settings = EngineSettings::from_section(&config.engine)?;
        let nodes = Arc::new(MemoryNodeStore::new(config.build_graph()?));
        let values = Arc::new(MemoryValueStore::new());
        Self::start(settings, nodes, values, evaluators)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &Arc<WorkScheduler> {
        &self.scheduler
    }

    pub fn nodes(&self) -> &Arc<dyn NodeStore> {
        &self.nodes
    }

    pub fn values(&self) -> &Arc<dyn ValueStore> {
        &self.values
    }

    /// Store a new root value and schedule every dependent of `root` on it.
    pub fn ingest(&self, root: NodeId, payload: serde_json::Value) -> Result<Value> {
        self.root_node(root)?;
        let value = self.values.insert(NewValue::root(root, payload))?;
        let scheduled = self.schedule_dependents(root, value.id);
        debug!(node = %root, value = %value.id, scheduled, "ingested root value");
        Ok(value)
    }

    /// Replace the payload of a root value and re-run its dependents.
    pub fn update_root(&self, value: ValueId, payload: serde_json::Value) -> Result<Value> {
        let stored = self
            .values
            .value(value)
            .ok_or(NodeflowError::ValueNotFound(value))?;
        self.root_node(stored.node)?;

        let updated = self.values.update(value, payload)?;
        let scheduled = self.schedule_dependents(updated.node, updated.id);
        debug!(node = %updated.node, value = %updated.id, scheduled, "updated root value");
        Ok(updated)
    }

    /// Delete a value with everything derived from it and drop pending work
    /// that carries any of the deleted values.
    pub fn retract(&self, value: ValueId) -> Result<Vec<ValueId>> {
        let removed: BTreeSet<ValueId> = self.values.delete(value)?.into_iter().collect();
        let cancelled = self
            .scheduler
            .retain_pending(|item| item.sources().is_disjoint(&removed));
        debug!(value = %value, removed = removed.len(), cancelled, "retracted value");
        Ok(removed.into_iter().collect())
    }

    /// Schedule a run-once global item for `node`.
    pub fn trigger(&self, node: NodeId) -> Result<bool> {
        if self.nodes.node(node).is_none() {
            return Err(NodeflowError::NodeNotFound(node));
        }
        Ok(self.scheduler.submit(WorkItem::global(node)))
    }

    /// Resubmit items from an earlier [`pending_snapshot`](Self::pending_snapshot).
    pub fn recover(&self, items: Vec<WorkItem>) -> usize {
        let offered = items.len();
        let accepted = self.scheduler.submit_all(items);
        info!(offered, accepted, "recovered pending work");
        accepted
    }

    /// Items not yet claimed by a worker, in their queued order.
    pub fn pending_snapshot(&self) -> Vec<WorkItem> {
        self.scheduler.pending()
    }

    /// Drop pending work targeting any of `nodes`. Running items finish.
    pub fn cancel_node_work(&self, nodes: &[NodeId]) -> usize {
        let cancelled = self
            .scheduler
            .retain_pending(|item| !nodes.contains(&item.target()));
        debug!(?nodes, cancelled, "cancelled node work");
        cancelled
    }

    /// Hand out the runner event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<RunnerEvent>> {
        self.events.take()
    }

    /// Block until no work is pending or active, or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.scheduler.wait_idle(timeout)
    }

    /// [`wait_idle`](Self::wait_idle) bounded by the configured idle timeout.
    pub fn run_to_idle(&self) -> bool {
        self.wait_idle(self.settings.idle_timeout)
    }

    /// Async variant of [`wait_idle`](Self::wait_idle) that parks a blocking
    /// thread instead of the caller's runtime worker.
    pub async fn quiesce(&self, timeout: Duration) -> Result<bool> {
        let scheduler = Arc::clone(&self.scheduler);
        tokio::task::spawn_blocking(move || scheduler.wait_idle(timeout))
            .await
            .map_err(|e| NodeflowError::Other(e.into()))
    }

    /// Close the scheduler and join every worker.
    ///
    /// Returns the work that never ran: pending items, then retries and
    /// follow-ups offered while the workers were finishing. Feed them to
    /// [`recover`](Self::recover) on the next start.
    pub fn shutdown(self) -> Vec<WorkItem> {
        let Self {
            scheduler, pool, ..
        } = self;
        pool.shutdown();
        let leftover = scheduler.leftovers();
        info!(
            leftover = leftover.len(),
            parked = scheduler.parked().len(),
            "engine stopped"
        );
        leftover
    }

    fn root_node(&self, id: NodeId) -> Result<Node> {
        let node = self.nodes.node(id).ok_or(NodeflowError::NodeNotFound(id))?;
        if !node.is_root() {
            return Err(NodeflowError::NotARoot(id));
        }
        Ok(node)
    }

    /// Submit one item per complete input combination of each dependent.
    /// A join whose other sources have no value yet is scheduled later, by
    /// whichever evaluation fills them in.
    fn schedule_dependents(&self, node: NodeId, value: ValueId) -> usize {
        let context = BTreeSet::from([value]);
        self.nodes
            .dependents_of(node)
            .into_iter()
            .flat_map(|dependent| {
                self.resolver
                    .combinations(&dependent, &context)
                    .into_iter()
                    .map(move |sources| WorkItem::new(dependent.id, sources))
            })
            .filter(|item| self.scheduler.submit(item.clone()))
            .count()
    }
}
