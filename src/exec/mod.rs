// src/exec/mod.rs

//! Work execution layer.
//!
//! - [`evaluator`] provides the per-kind [`Evaluator`] trait and the
//!   [`EvaluatorRegistry`] the runner looks kinds up in.
//! - [`inputs`] picks the one value per source node an evaluation consumes.
//! - [`runner`] executes one claimed work item: evaluate, diff against
//!   stored values, schedule dependents, retry or drop on failure.
//! - [`pool`] owns the worker threads that feed the runner.

pub mod evaluator;
pub mod inputs;
pub mod pool;
pub mod runner;

pub use evaluator::{Evaluator, EvaluatorRegistry, Inputs};
pub use inputs::{InputResolver, Resolved};
pub use pool::WorkerPool;
pub use runner::{DiffSummary, RunOutcome, Runner, RunnerEvent};
