// src/engine/driver.rs

use std::collections::HashMap;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::carrier::{Mailbox, Outbox};
use crate::errors::ProtocolError;
use crate::graph::{NodeId, DRIVER_NODE_ID};
use crate::interceptor::MessageKind;

/// The virtual endpoint at the rim of the pipeline.
///
/// The driver owns node id 0 and appears as the upstream of every source
/// stage and the downstream of every sink stage. To push `steps` items
/// through the pipeline it grants readiness credits to each source (at
/// most `max_ready` outstanding at a time), then services its own mailbox
/// like any other node:
///
/// - DataReady from a sink is one delivered pipeline output; it is
///   acknowledged immediately with DataUseless so the sink never stalls
///   on the driver's capacity.
/// - DataUseless from a source is a returned credit; if that source has
///   not yet been granted all `steps` credits, a fresh DataReady tops it
///   up.
///
/// The run completes when every sink has delivered `steps` outputs.
pub struct Driver {
    outbox: Outbox,
    mailbox: Mailbox,
    sources: Vec<NodeId>,
    sinks: Vec<NodeId>,
    steps: u64,
    /// Upstream credit cap mirrored from the pipeline config; the driver
    /// must never push a source's ready count past it.
    max_ready: Option<u64>,
    shutdown: watch::Receiver<bool>,
}

impl Driver {
    pub fn new(
        outbox: Outbox,
        mailbox: Mailbox,
        sources: Vec<NodeId>,
        sinks: Vec<NodeId>,
        steps: u64,
        max_ready: Option<u64>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            outbox,
            mailbox,
            sources,
            sinks,
            steps,
            max_ready,
            shutdown,
        }
    }

    /// Seed the sources and service the mailbox until the run completes,
    /// shutdown is signalled, or a protocol violation surfaces.
    pub async fn run(mut self) -> Result<(), ProtocolError> {
        let initial_grant = self.max_ready.unwrap_or(u64::MAX).min(self.steps);

        info!(
            steps = self.steps,
            initial_grant,
            sources = self.sources.len(),
            sinks = self.sinks.len(),
            "driver: seeding source credits"
        );

        // Credits granted so far, per source.
        let mut granted: HashMap<NodeId, u64> = HashMap::new();
        for &source in &self.sources {
            for _ in 0..initial_grant {
                self.outbox.send(source, MessageKind::DataReady)?;
            }
            granted.insert(source, initial_grant);
        }

        let mut delivered: HashMap<NodeId, u64> =
            self.sinks.iter().map(|&sink| (sink, 0)).collect();

        let expected_total = self.steps * self.sinks.len() as u64;
        let mut total: u64 = 0;

        while total < expected_total {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!(total, expected_total, "driver: stopping early (shutdown)");
                        return Ok(());
                    }
                }
                maybe = self.mailbox.recv() => {
                    let Some(msg) = maybe else {
                        info!(total, expected_total, "driver: mailbox closed; stopping");
                        return Ok(());
                    };

                    match msg.kind {
                        MessageKind::DataReady => {
                            let count = delivered.get_mut(&msg.src).ok_or(
                                ProtocolError::UnknownUpstream {
                                    node: DRIVER_NODE_ID,
                                    src: msg.src,
                                },
                            )?;
                            *count += 1;
                            total += 1;
                            debug!(sink = %msg.src, delivered = *count, "driver: sink output received");

                            // Free the sink's buffer slot right away.
                            self.outbox.send(msg.src, MessageKind::DataUseless)?;
                        }
                        MessageKind::DataUseless => {
                            let sent = granted.get_mut(&msg.src).ok_or(
                                ProtocolError::UnknownDownstream {
                                    node: DRIVER_NODE_ID,
                                    src: msg.src,
                                },
                            )?;

                            if *sent < self.steps {
                                *sent += 1;
                                debug!(source = %msg.src, granted = *sent, "driver: credit returned; granting next item");
                                self.outbox.send(msg.src, MessageKind::DataReady)?;
                            } else {
                                debug!(source = %msg.src, "driver: credit returned");
                            }
                        }
                    }
                }
            }
        }

        info!(total, "driver: pipeline run complete");
        Ok(())
    }
}
