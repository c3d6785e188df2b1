#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use nodeflow::config::{ConfigFile, EngineSection, NodeConfig, RawConfigFile};
use nodeflow::store::{MemoryNodeStore, MemoryValueStore};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection::default(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_node(mut self, name: &str, node: NodeConfig) -> Self {
        self.config.node.insert(name.to_string(), node);
        self
    }

    /// Shorthand for a root node of kind `"root"`.
    pub fn with_root(self, name: &str) -> Self {
        self.with_node(name, NodeConfigBuilder::new("root").build())
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.engine.workers = workers;
        self
    }

    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.config.engine.retry_limit = retry_limit;
        self
    }

    pub fn idle_timeout(mut self, timeout: &str) -> Self {
        self.config.engine.idle_timeout = timeout.to_string();
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(kind: &str) -> Self {
        Self {
            node: NodeConfig {
                kind: kind.to_string(),
                sources: vec![],
                cumulative: false,
            },
        }
    }

    pub fn source(mut self, name: &str) -> Self {
        self.node.sources.push(name.to_string());
        self
    }

    pub fn cumulative(mut self, val: bool) -> Self {
        self.node.cumulative = val;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}

/// In-memory stores holding the graph described by `cfg`.
pub fn memory_stores(cfg: &ConfigFile) -> (Arc<MemoryNodeStore>, Arc<MemoryValueStore>) {
    let graph = cfg.build_graph().expect("config should build a node graph");
    (
        Arc::new(MemoryNodeStore::new(graph)),
        Arc::new(MemoryValueStore::new()),
    )
}
