// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::{NodeId, ValueId};

#[derive(Error, Debug)]
pub enum NodeflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid node name: {0:?}")]
    InvalidName(String),

    #[error("Node name already in use: {0}")]
    DuplicateName(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Value not found: {0}")]
    ValueNotFound(ValueId),

    #[error("Node '{node}' refers to unknown source {source_id}")]
    UnknownSource { node: String, source_id: NodeId },

    #[error("Cycle detected in node graph: {0}")]
    DagCycle(String),

    #[error("Node {0} has sources and cannot accept ingested values")]
    NotARoot(NodeId),

    #[error("No evaluator registered for node kind '{0}'")]
    UnknownKind(String),

    #[error("Evaluation of node {node} failed: {message}")]
    Evaluation { node: NodeId, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeflowError {
    /// Whether running the same work item again could succeed.
    ///
    /// A missing node or an unregistered kind stays missing, so those are
    /// dropped on the first failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            NodeflowError::NodeNotFound(_) | NodeflowError::UnknownKind(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, NodeflowError>;
