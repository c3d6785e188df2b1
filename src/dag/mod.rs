// src/dag/mod.rs

//! Node and value graphs.
//!
//! - [`sort`] holds the stable, cycle-tolerant topological sort shared by
//!   the node graph and the work scheduler.
//! - [`node`] defines the [`Node`] shape and name validation.
//! - [`graph`] keeps the node DAG, validates edits and keeps source lists
//!   in dependency order.
//! - [`value`] defines values, their positional paths and payload digests.

pub mod graph;
pub mod node;
pub mod sort;
pub mod value;

pub use graph::NodeGraph;
pub use node::{Node, NodeSpec};
pub use value::{NewValue, Value, ValuePath};
