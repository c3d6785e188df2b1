// src/config/model.rs

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::sort::sort;
use crate::dag::{NodeGraph, NodeSpec};
use crate::errors::{NodeflowError, Result};
use crate::types::{parse_duration, NodeKind};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// workers = 4
/// retry_limit = 3
/// idle_timeout = "30s"
///
/// [node.raw]
/// kind = "root"
///
/// [node.upper]
/// kind = "uppercase"
/// sources = ["raw"]
/// ```
///
/// All sections are optional at parse time; validation requires at least
/// one node.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// Declared nodes keyed by node name.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,
}

/// A validated configuration. Build one with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub node: BTreeMap<String, NodeConfig>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Number of worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How many times a failing work item is re-enqueued before it is
    /// dropped.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Upper bound for [`crate::engine::Engine::run_to_idle`], as a duration
    /// string (`"500ms"`, `"30s"`, `"2m"`).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,
}

fn default_workers() -> usize {
    4
}

fn default_retry_limit() -> u32 {
    3
}

fn default_idle_timeout() -> String {
    "30s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_limit: default_retry_limit(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl EngineSection {
    /// Parsed `idle_timeout`. Validated configs always parse.
    pub fn idle_timeout(&self) -> Result<Duration> {
        parse_duration(&self.idle_timeout).map_err(|e| {
            NodeflowError::ConfigError(format!("[engine].idle_timeout: {e}"))
        })
    }
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Evaluator kind tag. Root nodes usually use `"root"`.
    pub kind: String,

    /// Names of source nodes.
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub cumulative: bool,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(engine: EngineSection, node: BTreeMap<String, NodeConfig>) -> Self {
        Self { engine, node }
    }

    /// Build a [`NodeGraph`] with every declared node.
    ///
    /// Nodes are inserted in dependency order so each node's sources exist
    /// before it does.
    pub fn build_graph(&self) -> Result<NodeGraph> {
        let names: Vec<&String> = self.node.keys().collect();
        let ordered = sort(names, |name| {
            self.node
                .get(*name)
                .map(|n| n.sources.iter().collect::<Vec<_>>())
                .unwrap_or_default()
        });

        let mut graph = NodeGraph::new();
        let mut ids = HashMap::new();

        for name in ordered {
            let Some(cfg) = self.node.get(name) else {
                continue;
            };
            let mut sources = Vec::with_capacity(cfg.sources.len());
            for source in &cfg.sources {
                let id = ids.get(source).copied().ok_or_else(|| {
                    NodeflowError::ConfigError(format!(
                        "node '{}' has unknown source '{}'",
                        name, source
                    ))
                })?;
                sources.push(id);
            }

            let spec = NodeSpec::new(name.clone(), NodeKind::new(cfg.kind.clone()))
                .with_sources(sources)
                .cumulative(cfg.cumulative);
            let id = graph.add_node(spec)?;
            ids.insert(name.clone(), id);
        }

        Ok(graph)
    }
}
