// src/work/item.rs

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, ValueId};

/// Logical identity of a work item: target node plus source values.
///
/// Two items with equal keys are duplicates regardless of retry count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkKey {
    pub target: NodeId,
    pub sources: BTreeSet<ValueId>,
}

/// A request to (re)compute `target` from a set of source values.
///
/// Follow-up work carries exactly one value per source node of `target`,
/// the combination the resulting values will record as their sources.
///
/// Immutable once built; a retry produces a new item via
/// [`WorkItem::next_attempt`]. An item with no source values is a
/// "run once globally" request for its node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    target: NodeId,
    sources: BTreeSet<ValueId>,
    #[serde(default)]
    retry_count: u32,
}

impl WorkItem {
    pub fn new(target: NodeId, sources: impl IntoIterator<Item = ValueId>) -> Self {
        Self {
            target,
            sources: sources.into_iter().collect(),
            retry_count: 0,
        }
    }

    /// An item with no source values.
    pub fn global(target: NodeId) -> Self {
        Self::new(target, [])
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn sources(&self) -> &BTreeSet<ValueId> {
        &self.sources
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_global(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn key(&self) -> WorkKey {
        WorkKey {
            target: self.target,
            sources: self.sources.clone(),
        }
    }

    /// Same target and same source values.
    pub fn is_duplicate_of(&self, other: &WorkItem) -> bool {
        self.target == other.target && self.sources == other.sources
    }

    pub fn matches(&self, key: &WorkKey) -> bool {
        self.target == key.target && self.sources == key.sources
    }

    /// Whether the two items consume at least one common value.
    pub fn shares_sources_with(&self, other: &WorkItem) -> bool {
        // Both sets are ordered, so walk the smaller one.
        let (small, large) = if self.sources.len() <= other.sources.len() {
            (&self.sources, &other.sources)
        } else {
            (&other.sources, &self.sources)
        };
        small.iter().any(|v| large.contains(v))
    }

    /// The item to enqueue when this attempt failed and may be retried.
    pub fn next_attempt(&self) -> WorkItem {
        WorkItem {
            target: self.target,
            sources: self.sources.clone(),
            retry_count: self.retry_count + 1,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.target)?;
        for (i, v) in self.sources.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str("]")?;
        if self.retry_count > 0 {
            write!(f, "#{}", self.retry_count)?;
        }
        Ok(())
    }
}
