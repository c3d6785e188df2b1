// src/work/mod.rs

//! Work items and their scheduling.
//!
//! - [`item`] defines the immutable [`WorkItem`] and its logical identity.
//! - [`predicate`] decides whether one item must run after another.
//! - [`scheduler`] holds the blocking, order-aware [`WorkScheduler`].

pub mod item;
pub mod predicate;
pub mod scheduler;

pub use item::{WorkItem, WorkKey};
pub use predicate::{DependencyPredicate, GraphPredicate};
pub use scheduler::{Submission, WorkScheduler};
