// src/ops.rs

//! Operator execution seam.
//!
//! The scheduler decides *when* a stage may run; what the stage actually
//! does is opaque to it and delegated through [`StageRunner`]. The call is
//! synchronous and is assumed to finish before flow-control bookkeeping
//! proceeds; a returned error is a fatal abort of the pipeline run.

use anyhow::Result;
use tracing::info;

use crate::graph::NodeId;

/// Executes one unit of a stage's work.
pub trait StageRunner: Send + Sync {
    fn run_stage(&self, node: NodeId, stage: &str) -> Result<()>;
}

/// Default runner: logs the execution and does nothing else.
///
/// Useful for dry exercising a topology and as the binary's default until
/// real operator execution is plugged in.
#[derive(Debug, Default)]
pub struct LogStageRunner;

impl StageRunner for LogStageRunner {
    fn run_stage(&self, node: NodeId, stage: &str) -> Result<()> {
        info!(node = %node, stage = %stage, "executing stage work");
        Ok(())
    }
}
