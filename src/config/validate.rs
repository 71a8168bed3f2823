// src/config/validate.rs

use anyhow::{anyhow, Result};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - there is at least one stage
/// - `buffer_capacity >= 1` globally and per stage
/// - `max_ready >= 1` when set
/// - `steps >= 1`
/// - all `after` dependencies refer to existing stages
/// - no stage depends on itself
/// - the stage graph has no cycles
///
/// It does **not** check that stage `kind` names are registered; that is
/// resolved against the interceptor registry when the pipeline is built.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    ensure_has_stages(cfg)?;
    validate_flow_bounds(cfg)?;
    validate_stage_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_stages(cfg: &ConfigFile) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(anyhow!(
            "config must contain at least one [stage.<name>] section"
        ));
    }
    Ok(())
}

fn validate_flow_bounds(cfg: &ConfigFile) -> Result<()> {
    if cfg.pipeline.buffer_capacity == 0 {
        return Err(anyhow!(
            "[pipeline].buffer_capacity must be >= 1 (got 0)"
        ));
    }

    if cfg.pipeline.max_ready == Some(0) {
        return Err(anyhow!("[pipeline].max_ready must be >= 1 when set (got 0)"));
    }

    if cfg.pipeline.steps == 0 {
        return Err(anyhow!("[pipeline].steps must be >= 1 (got 0)"));
    }

    for (name, stage) in cfg.stage.iter() {
        if stage.buffer_capacity == Some(0) {
            return Err(anyhow!(
                "stage '{}' has buffer_capacity = 0; must be >= 1",
                name
            ));
        }
    }

    Ok(())
}

fn validate_stage_dependencies(cfg: &ConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            if !cfg.stage.contains_key(dep) {
                return Err(anyhow!(
                    "stage '{}' has unknown dependency '{}' in `after`",
                    name,
                    dep
                ));
            }
            if dep == name {
                return Err(anyhow!(
                    "stage '{}' cannot depend on itself in `after`",
                    name
                ));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &ConfigFile) -> Result<()> {
    // Build a petgraph graph from the stages and their dependencies.
    //
    // Edge direction: dep -> stage
    // For:
    //   [stage.train]
    //   after = ["load"]
    // we add edge load -> train.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.stage.keys() {
        graph.add_node(name.as_str());
    }

    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(anyhow!(
                "cycle detected in stage DAG involving stage '{}'",
                node
            ))
        }
    }
}
