// src/engine/runtime.rs

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::carrier::{mailbox_loop, Routes};
use crate::engine::driver::Driver;
use crate::errors::ProtocolError;
use crate::graph::{NodeId, Topology, DRIVER_NODE_ID};
use crate::interceptor::{InterceptorSpawn, Registry};
use crate::ops::StageRunner;

/// The pipeline orchestrator.
///
/// Responsibilities:
/// - build the mailboxes and routing table for the driver plus all stages
/// - instantiate one interceptor per stage through the registry
/// - spawn one mailbox loop per interceptor
/// - run the driver to completion
/// - signal shutdown and surface the first fatal error, if any
pub struct PipelineRuntime {
    topology: Topology,
    registry: Registry,
    max_ready: Option<u64>,
    runner: Arc<dyn StageRunner>,
    steps: u64,
}

impl PipelineRuntime {
    pub fn new(
        topology: Topology,
        registry: Registry,
        max_ready: Option<u64>,
        runner: Arc<dyn StageRunner>,
        steps: u64,
    ) -> Self {
        Self {
            topology,
            registry,
            max_ready,
            runner,
            steps,
        }
    }

    /// Execute one pipeline run of `steps` items.
    pub async fn run(self) -> Result<()> {
        let mut ids: Vec<NodeId> = vec![DRIVER_NODE_ID];
        ids.extend(self.topology.nodes().map(|node| node.id));

        let (routes, mut mailboxes) = Routes::build(ids);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // One mailbox loop per stage interceptor.
        let mut loops: JoinSet<Result<NodeId, ProtocolError>> = JoinSet::new();
        for node in self.topology.nodes() {
            let spawn = InterceptorSpawn {
                node: node.clone(),
                max_ready: self.max_ready,
                outbox: routes.outbox(node.id),
                runner: Arc::clone(&self.runner),
            };

            let interceptor = self
                .registry
                .create(&node.kind, spawn)
                .with_context(|| format!("constructing interceptor for stage '{}'", node.name))?;

            let mailbox = mailboxes
                .remove(&node.id)
                .ok_or_else(|| anyhow!("no mailbox built for node {}", node.id))?;

            loops.spawn(mailbox_loop(interceptor, mailbox, shutdown_rx.clone()));
        }

        let driver_mailbox = mailboxes
            .remove(&DRIVER_NODE_ID)
            .ok_or_else(|| anyhow!("no mailbox built for the driver"))?;

        let driver = Driver::new(
            routes.outbox(DRIVER_NODE_ID),
            driver_mailbox,
            self.topology.sources().to_vec(),
            self.topology.sinks().to_vec(),
            self.steps,
            self.max_ready,
            shutdown_rx.clone(),
        );

        info!(
            stages = self.topology.len(),
            steps = self.steps,
            "pipeline run starting"
        );

        // Run the driver while watching for interceptor loops that end
        // early (a clean early exit is a wiring anomaly; an error is fatal)
        // and for Ctrl-C.
        let driver_fut = driver.run();
        tokio::pin!(driver_fut);

        let mut pipeline_err: Option<anyhow::Error> = None;

        loop {
            tokio::select! {
                res = &mut driver_fut => {
                    if let Err(err) = res {
                        pipeline_err = Some(err.into());
                    }
                    break;
                }
                joined = loops.join_next() => {
                    match joined {
                        None => {
                            warn!("all interceptor loops exited before the driver finished");
                            break;
                        }
                        Some(Ok(Ok(node))) => {
                            warn!(node = %node, "interceptor mailbox closed before the run completed");
                        }
                        Some(Ok(Err(err))) => {
                            pipeline_err = Some(err.into());
                            break;
                        }
                        Some(Err(join_err)) => {
                            pipeline_err = Some(anyhow!("interceptor task panicked: {join_err}"));
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested (ctrl-c)");
                    break;
                }
            }
        }

        // Stop the remaining loops and collect their exits; keep the first
        // error observed.
        let _ = shutdown_tx.send(true);
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok(Ok(node)) => debug!(node = %node, "interceptor loop joined"),
                Ok(Err(err)) => {
                    if pipeline_err.is_none() {
                        pipeline_err = Some(err.into());
                    }
                }
                Err(join_err) => {
                    if pipeline_err.is_none() {
                        pipeline_err = Some(anyhow!("interceptor task panicked: {join_err}"));
                    }
                }
            }
        }

        match pipeline_err {
            None => {
                info!("pipeline run finished");
                Ok(())
            }
            Some(err) => Err(err).context("pipeline run failed"),
        }
    }
}
