// src/exec/runner.rs

//! Execution of a single work item.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::value::payload_digest;
use crate::dag::{NewValue, Node, Value, ValuePath};
use crate::errors::{NodeflowError, Result};
use crate::exec::evaluator::{Evaluator, EvaluatorRegistry, Inputs};
use crate::exec::inputs::InputResolver;
use crate::store::{NodeStore, ValueStore};
use crate::types::ValueId;
use crate::work::{Submission, WorkItem, WorkScheduler};

/// What one successful evaluation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Follow-up work items accepted by the scheduler.
    pub scheduled: usize,
    /// Follow-up work items the closed scheduler kept for recovery.
    pub parked: usize,
}

/// Result of [`Runner::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(DiffSummary),
    /// Failed; the next attempt was enqueued.
    Retried { attempt: u32 },
    /// Failed permanently and removed from the scheduler.
    Dropped,
    /// Failed after the scheduler closed; the next attempt was parked.
    Parked,
}

/// Events reported by runners, for logging sinks and tests.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Completed {
        item: WorkItem,
        summary: DiffSummary,
    },
    Retrying {
        item: WorkItem,
        attempt: u32,
        error: String,
    },
    /// A permanently failed item. Reported exactly once per drop.
    Dropped {
        item: WorkItem,
        error: String,
    },
    /// A retry the closed scheduler parked. `item` is the next attempt.
    Parked {
        item: WorkItem,
        error: String,
    },
}

/// Completes the item on drop, so the scheduler hears about every claimed
/// item whether evaluation succeeded, failed, or panicked.
struct CompletionGuard<'a> {
    scheduler: &'a WorkScheduler,
    item: &'a WorkItem,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.complete(self.item);
    }
}

/// Binds claimed work items to evaluators and stores.
pub struct Runner {
    nodes: Arc<dyn NodeStore>,
    values: Arc<dyn ValueStore>,
    evaluators: EvaluatorRegistry,
    scheduler: Arc<WorkScheduler>,
    resolver: InputResolver,
    retry_limit: u32,
    events: Option<mpsc::UnboundedSender<RunnerEvent>>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("evaluators", &self.evaluators)
            .field("retry_limit", &self.retry_limit)
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        values: Arc<dyn ValueStore>,
        evaluators: EvaluatorRegistry,
        scheduler: Arc<WorkScheduler>,
        retry_limit: u32,
    ) -> Self {
        let resolver = InputResolver::new(Arc::clone(&nodes), Arc::clone(&values));
        Self {
            nodes,
            values,
            evaluators,
            scheduler,
            resolver,
            retry_limit,
            events: None,
        }
    }

    /// Report [`RunnerEvent`]s on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<RunnerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn scheduler(&self) -> &Arc<WorkScheduler> {
        &self.scheduler
    }

    /// Execute a claimed item and complete it.
    ///
    /// `item` must have been handed out by this runner's scheduler.
    pub fn run(&self, item: WorkItem) -> RunOutcome {
        let _guard = CompletionGuard {
            scheduler: &self.scheduler,
            item: &item,
        };

        match self.execute(&item) {
            Ok(summary) => {
                info!(
                    item = %item,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    unchanged = summary.unchanged,
                    deleted = summary.deleted,
                    scheduled = summary.scheduled,
                    parked = summary.parked,
                    "work item completed"
                );
                self.emit(RunnerEvent::Completed {
                    item: item.clone(),
                    summary,
                });
                RunOutcome::Completed(summary)
            }
            Err(err) => self.handle_failure(&item, err),
        }
    }

    fn execute(&self, item: &WorkItem) -> Result<DiffSummary> {
        let node = self
            .nodes
            .node(item.target())
            .ok_or(NodeflowError::NodeNotFound(item.target()))?;
        let evaluator = self
            .evaluators
            .get(&node.kind)
            .ok_or_else(|| NodeflowError::UnknownKind(node.kind.to_string()))?;

        let resolved = self.resolver.resolve(&node, item.sources());
        if !item.is_global() && !resolved.is_complete() {
            debug!(
                item = %item,
                node = %node.name,
                missing = ?resolved.missing,
                "inputs not ready; nothing to evaluate"
            );
            return Ok(DiffSummary::default());
        }
        debug!(
            item = %item,
            node = %node.name,
            kind = %node.kind,
            inputs = resolved.inputs.len(),
            "evaluating work item"
        );

        let candidates = evaluate_guarded(evaluator.as_ref(), &node, &resolved.inputs)?;
        self.apply(&node, &resolved.consumed(), candidates)
    }

    /// Diff candidates against the values stored for the same consumed
    /// inputs by positional path, write the changes and schedule dependents.
    fn apply(
        &self,
        node: &Node,
        consumed: &BTreeSet<ValueId>,
        candidates: Vec<serde_json::Value>,
    ) -> Result<DiffSummary> {
        let mut existing: BTreeMap<ValuePath, Value> = self
            .values
            .derived_values(node.id, consumed)
            .into_iter()
            .map(|v| (self.values.path_of(&v), v))
            .collect();

        let mut summary = DiffSummary::default();
        let mut produced: Vec<ValueId> = Vec::with_capacity(candidates.len());

        for (position, payload) in candidates.into_iter().enumerate() {
            let candidate = NewValue {
                node: node.id,
                sources: consumed.clone(),
                position,
                payload,
            };

            match existing.remove(&candidate.path()) {
                Some(stored) if stored.digest == payload_digest(&candidate.payload) => {
                    summary.unchanged += 1;
                    produced.push(stored.id);
                }
                Some(stored) => {
                    let updated = self.values.update(stored.id, candidate.payload)?;
                    summary.updated += 1;
                    produced.push(updated.id);
                }
                None => {
                    let inserted = self.values.insert(candidate)?;
                    summary.inserted += 1;
                    produced.push(inserted.id);
                }
            }
        }

        for stale in existing.into_values() {
            match self.values.delete(stale.id) {
                Ok(_) => summary.deleted += 1,
                // Already removed as a descendant of an earlier deletion.
                Err(NodeflowError::ValueNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let dependents = self.nodes.dependents_of(node.id);
        for value in produced {
            let mut context = consumed.clone();
            context.insert(value);
            for dependent in &dependents {
                for sources in self.resolver.combinations(dependent, &context) {
                    match self.scheduler.offer(WorkItem::new(dependent.id, sources)) {
                        Submission::Accepted => summary.scheduled += 1,
                        Submission::Parked => summary.parked += 1,
                        Submission::Duplicate => {}
                    }
                }
            }
        }

        Ok(summary)
    }

    fn handle_failure(&self, item: &WorkItem, err: NodeflowError) -> RunOutcome {
        if err.is_retryable() && item.retry_count() < self.retry_limit {
            let attempt = item.retry_count() + 1;
            if self.scheduler.retry(item) == Submission::Parked {
                warn!(
                    item = %item,
                    attempt,
                    error = %err,
                    "work item failed after close; retry parked"
                );
                self.emit(RunnerEvent::Parked {
                    item: item.next_attempt(),
                    error: err.to_string(),
                });
                return RunOutcome::Parked;
            }

            warn!(
                item = %item,
                attempt,
                retry_limit = self.retry_limit,
                error = %err,
                "work item failed; retrying"
            );
            self.emit(RunnerEvent::Retrying {
                item: item.clone(),
                attempt,
                error: err.to_string(),
            });
            return RunOutcome::Retried { attempt };
        }

        error!(
            item = %item,
            retries = item.retry_count(),
            error = %err,
            "work item dropped"
        );
        self.emit(RunnerEvent::Dropped {
            item: item.clone(),
            error: err.to_string(),
        });
        RunOutcome::Dropped
    }

    fn emit(&self, event: RunnerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

fn evaluate_guarded(
    evaluator: &dyn Evaluator,
    node: &Node,
    inputs: &Inputs,
) -> Result<Vec<serde_json::Value>> {
    match panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(node, inputs))) {
        Ok(Ok(candidates)) => Ok(candidates),
        Ok(Err(err)) => Err(NodeflowError::Evaluation {
            node: node.id,
            message: format!("{err:#}"),
        }),
        Err(_) => Err(NodeflowError::Evaluation {
            node: node.id,
            message: "evaluator panicked".to_string(),
        }),
    }
}
