// src/lib.rs

//! nodeflow: an incremental dependency-graph computation engine.
//!
//! Values enter at root nodes. Every node downstream of a changed value is
//! re-evaluated by a pool of workers, and its output is diffed against what
//! is already stored so that only real changes propagate further.
//!
//! Work is coordinated by [`work::WorkScheduler`], which hands a work item
//! to a worker only once nothing it depends on is queued ahead of it or
//! running.

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod store;
pub mod types;
pub mod work;

pub use engine::{Engine, EngineSettings};
pub use errors::{NodeflowError, Result};
