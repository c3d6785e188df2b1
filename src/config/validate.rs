// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::node::validate_name;
use crate::errors::{NodeflowError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = NodeflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.engine, raw.node))
    }
}

/// Run every semantic check on a parsed config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_engine_section(cfg)?;
    validate_node_names(cfg)?;
    validate_node_sources(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(NodeflowError::ConfigError(
            "config must contain at least one [node.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.workers == 0 {
        return Err(NodeflowError::ConfigError(
            "[engine].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    cfg.engine.idle_timeout()?;
    Ok(())
}

fn validate_node_names(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        validate_name(name)?;
        if node.kind.trim().is_empty() {
            return Err(NodeflowError::ConfigError(format!(
                "node '{}' has an empty `kind`",
                name
            )));
        }
    }
    Ok(())
}

fn validate_node_sources(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        for source in node.sources.iter() {
            if !cfg.node.contains_key(source) {
                return Err(NodeflowError::ConfigError(format!(
                    "node '{}' has unknown source '{}' in `sources`",
                    name, source
                )));
            }
            if source == name {
                return Err(NodeflowError::ConfigError(format!(
                    "node '{}' cannot list itself in `sources`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: source -> node. For
    //   [node.B]
    //   sources = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }

    for (name, node) in cfg.node.iter() {
        for source in node.sources.iter() {
            graph.add_edge(source.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(NodeflowError::DagCycle(format!(
            "cycle detected in node graph involving node '{}'",
            cycle.node_id()
        ))),
    }
}
