// src/lib.rs

pub mod carrier;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod interceptor;
pub mod logging;
pub mod ops;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::PipelineRuntime;
use crate::graph::Topology;
use crate::interceptor::Registry;
use crate::ops::LogStageRunner;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - topology construction
/// - interceptor registry
/// - the pipeline runtime (carrier + driver)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    let steps = args.steps.unwrap_or(cfg.pipeline.steps);
    if steps == 0 {
        return Err(anyhow!("--steps must be >= 1 (got 0)"));
    }

    let topology = Topology::from_config(&cfg);

    if args.dry_run {
        print_dry_run(&cfg, &topology, steps);
        return Ok(());
    }

    let registry = Registry::with_builtins();

    // Every configured kind must resolve before anything is spawned.
    for node in topology.nodes() {
        if !registry.contains(&node.kind) {
            return Err(anyhow!(
                "stage '{}' requests unknown interceptor kind '{}'",
                node.name,
                node.kind
            ));
        }
    }

    let runtime = PipelineRuntime::new(
        topology,
        registry,
        cfg.pipeline.max_ready,
        Arc::new(LogStageRunner),
        steps,
    );

    runtime.run().await
}

/// Simple dry-run output: print stages, edges and flow-control bounds.
fn print_dry_run(cfg: &ConfigFile, topology: &Topology, steps: u64) {
    println!("pipedag dry-run");
    println!("  pipeline.buffer_capacity = {}", cfg.pipeline.buffer_capacity);
    match cfg.pipeline.max_ready {
        Some(cap) => println!("  pipeline.max_ready = {cap}"),
        None => println!("  pipeline.max_ready = unbounded"),
    }
    println!("  steps = {steps}");
    println!();

    println!("stages ({}):", topology.len());
    for node in topology.nodes() {
        println!("  - {} (node {})", node.name, node.id);
        if node.kind != "compute" {
            println!("      kind: {}", node.kind);
        }
        println!("      upstream: {:?}", node.upstream);
        for down in &node.downstream {
            println!("      downstream: {} (capacity {})", down.id, down.capacity);
        }
    }

    println!();
    println!("sources (driver-fed): {:?}", topology.sources());
    println!("sinks (driver-drained): {:?}", topology.sinks());

    debug!("dry-run complete (no execution)");
}
