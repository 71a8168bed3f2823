// src/interceptor/compute.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::carrier::Outbox;
use crate::errors::ProtocolError;
use crate::graph::{NodeId, TaskNode};
use crate::interceptor::{Interceptor, Message, MessageKind};
use crate::ops::StageRunner;

/// Per-upstream readiness credits.
///
/// `ready` counts DataReady signals received but not yet consumed by a
/// local run. `max_ready` caps how far that upstream may run ahead;
/// unbounded by default.
#[derive(Debug, Clone, Copy)]
struct ReadyCredit {
    max_ready: u64,
    ready: u64,
}

/// Per-downstream output buffer occupancy.
///
/// `used` counts outputs sent to that downstream but not yet acknowledged
/// as consumed; `capacity` is the downstream's input queue depth.
#[derive(Debug, Clone, Copy)]
struct OutBuffer {
    capacity: u64,
    used: u64,
}

/// The scheduling unit for an ordinary pipeline stage.
///
/// Holds the credit/buffer tables for the stage's neighbors and decides,
/// on every inbound message, whether the stage may execute. There is no
/// idle/running state variable: runnability is recomputed from the tables
/// each time, so the scheduler is level-triggered.
///
/// All invariant checks happen at the point of mutation and are fatal;
/// violating them means the topology or the message stream is inconsistent
/// with construction-time setup.
pub struct ComputeInterceptor {
    id: NodeId,
    name: String,
    outbox: Outbox,
    runner: Arc<dyn StageRunner>,
    in_readys: HashMap<NodeId, ReadyCredit>,
    out_buffs: HashMap<NodeId, OutBuffer>,
}

impl ComputeInterceptor {
    /// Construct from the stage's static [`TaskNode`].
    ///
    /// One credit entry per upstream (`ready = 0`), one buffer entry per
    /// downstream (`used = 0`, capacity from the topology). `max_ready` of
    /// `None` leaves upstream credits unbounded.
    pub fn new(
        node: &TaskNode,
        max_ready: Option<u64>,
        outbox: Outbox,
        runner: Arc<dyn StageRunner>,
    ) -> Self {
        let max_ready = max_ready.unwrap_or(u64::MAX);

        let in_readys = node
            .upstream
            .iter()
            .map(|&up| (up, ReadyCredit { max_ready, ready: 0 }))
            .collect();

        let out_buffs = node
            .downstream
            .iter()
            .map(|down| {
                (
                    down.id,
                    OutBuffer {
                        capacity: down.capacity,
                        used: 0,
                    },
                )
            })
            .collect();

        Self {
            id: node.id,
            name: node.name.clone(),
            outbox,
            runner,
            in_readys,
            out_buffs,
        }
    }

    /// True iff every upstream has at least one unconsumed readiness
    /// signal. The stage is a synchronizing join: a fresh signal from
    /// *each* predecessor is required per execution.
    pub fn is_input_ready(&self) -> bool {
        self.in_readys.values().all(|credit| credit.ready > 0)
    }

    /// True iff every downstream has spare input queue capacity. Encodes
    /// backpressure: the stage may not get more than `capacity` outputs
    /// ahead of any single consumer.
    pub fn can_write_output(&self) -> bool {
        self.out_buffs
            .values()
            .all(|buff| buff.used < buff.capacity)
    }

    /// Unconsumed readiness signals from the given upstream, if known.
    pub fn ready_count(&self, up: NodeId) -> Option<u64> {
        self.in_readys.get(&up).map(|credit| credit.ready)
    }

    /// Outstanding unacknowledged outputs towards the given downstream,
    /// if known.
    pub fn buffered(&self, down: NodeId) -> Option<u64> {
        self.out_buffs.get(&down).map(|buff| buff.used)
    }

    fn increase_ready(&mut self, src: NodeId) -> Result<(), ProtocolError> {
        let credit = self
            .in_readys
            .get_mut(&src)
            .ok_or(ProtocolError::UnknownUpstream { node: self.id, src })?;

        if credit.ready >= credit.max_ready {
            return Err(ProtocolError::ReadyOverflow {
                node: self.id,
                src,
                max_ready: credit.max_ready,
            });
        }

        credit.ready += 1;
        Ok(())
    }

    fn decrease_buff(&mut self, src: NodeId) -> Result<(), ProtocolError> {
        let buff = self
            .out_buffs
            .get_mut(&src)
            .ok_or(ProtocolError::UnknownDownstream { node: self.id, src })?;

        if buff.used == 0 {
            return Err(ProtocolError::BufferUnderflow {
                node: self.id,
                dst: src,
            });
        }

        buff.used -= 1;
        Ok(())
    }

    /// Occupy one buffer slot per downstream and signal DataReady to each.
    ///
    /// Overflow here is unreachable under the `run` loop guard; hitting it
    /// means the bookkeeping was corrupted.
    fn send_data_ready_downstream(&mut self) -> Result<(), ProtocolError> {
        let node = self.id;
        for (&down, buff) in self.out_buffs.iter_mut() {
            if buff.used >= buff.capacity {
                return Err(ProtocolError::BufferOverflow {
                    node,
                    dst: down,
                    capacity: buff.capacity,
                });
            }
            buff.used += 1;

            debug!(node = %node, dst = %down, used = buff.used, "output buffered; notifying downstream");
            self.outbox.send(down, MessageKind::DataReady)?;
        }
        Ok(())
    }

    /// Consume one readiness credit per upstream and acknowledge each with
    /// DataUseless.
    ///
    /// Underflow here is unreachable under the `run` loop guard.
    fn reply_completed_upstream(&mut self) -> Result<(), ProtocolError> {
        let node = self.id;
        for (&up, credit) in self.in_readys.iter_mut() {
            if credit.ready == 0 {
                return Err(ProtocolError::ReadyUnderflow { node, src: up });
            }
            credit.ready -= 1;

            debug!(node = %node, dst = %up, ready = credit.ready, "input consumed; acknowledging upstream");
            self.outbox.send(up, MessageKind::DataUseless)?;
        }
        Ok(())
    }

}

impl Interceptor for ComputeInterceptor {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn handle(&mut self, msg: Message) -> Result<(), ProtocolError> {
        debug!(node = %self.id, src = %msg.src, kind = ?msg.kind, "message received");

        match msg.kind {
            MessageKind::DataReady => {
                self.increase_ready(msg.src)?;
                self.run()
            }
            MessageKind::DataUseless => {
                self.decrease_buff(msg.src)?;
                self.run()
            }
        }
    }

    /// Execute the stage as long as it stays runnable.
    ///
    /// The loop is bounded by available credits and buffer capacity and
    /// never blocks, so a single message arrival may trigger several
    /// consecutive executions but always returns. Calling this with no new
    /// messages is a no-op once the guards fail (level-triggered).
    fn run(&mut self) -> Result<(), ProtocolError> {
        while self.is_input_ready() && self.can_write_output() {
            debug!(node = %self.id, stage = %self.name, "stage runnable; executing");

            self.runner
                .run_stage(self.id, &self.name)
                .map_err(|err| ProtocolError::StageFailed {
                    node: self.id,
                    stage: self.name.clone(),
                    message: format!("{err:#}"),
                })?;

            self.send_data_ready_downstream()?;
            self.reply_completed_upstream()?;
        }
        Ok(())
    }
}
