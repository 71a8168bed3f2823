use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pipedag::carrier::{Mailbox, Routes};
use pipedag::graph::{Downstream, NodeId, TaskNode};
use pipedag::interceptor::{ComputeInterceptor, Interceptor, Message, MessageKind};
use pipedag::ops::StageRunner;

type TestResult = Result<(), Box<dyn Error>>;

#[derive(Default)]
struct CountingRunner {
    runs: AtomicU64,
}

impl CountingRunner {
    fn count(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

impl StageRunner for CountingRunner {
    fn run_stage(&self, _node: NodeId, _stage: &str) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn stage_node(id: NodeId, upstream: Vec<NodeId>, downstream: Vec<(NodeId, u64)>) -> TaskNode {
    TaskNode {
        id,
        name: format!("stage-{id}"),
        kind: "compute".into(),
        upstream,
        downstream: downstream
            .into_iter()
            .map(|(id, capacity)| Downstream { id, capacity })
            .collect(),
    }
}

fn drain(mailbox: &mut Mailbox) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(msg) = mailbox.try_recv() {
        out.push(msg);
    }
    out
}

const U: NodeId = NodeId(1);
const ME: NodeId = NodeId(2);
const D: NodeId = NodeId(3);

/// Scenario A: single stage, one upstream, one downstream with capacity 2.
/// The third input must stall until the downstream acknowledges.
#[test]
fn downstream_capacity_stalls_third_run() -> TestResult {
    let (routes, mut mailboxes) = Routes::build([U, ME, D]);
    let node = stage_node(ME, vec![U], vec![(D, 2)]);
    let runner = Arc::new(CountingRunner::default());
    let mut itc = ComputeInterceptor::new(&node, None, routes.outbox(ME), runner.clone());

    itc.handle(Message::new(MessageKind::DataReady, U))?;
    assert_eq!(runner.count(), 1);
    assert_eq!(itc.buffered(D), Some(1));
    assert_eq!(itc.ready_count(U), Some(0));

    itc.handle(Message::new(MessageKind::DataReady, U))?;
    assert_eq!(runner.count(), 2);
    assert_eq!(itc.buffered(D), Some(2));
    assert!(!itc.can_write_output());

    // Third input: inputs are ready but the output buffer is full.
    itc.handle(Message::new(MessageKind::DataReady, U))?;
    assert_eq!(runner.count(), 2, "stage must not run past downstream capacity");
    assert_eq!(itc.ready_count(U), Some(1));
    assert_eq!(itc.buffered(D), Some(2));

    // Downstream consumes one output; the stalled input goes through.
    itc.handle(Message::new(MessageKind::DataUseless, D))?;
    assert_eq!(runner.count(), 3);
    assert_eq!(itc.ready_count(U), Some(0));
    assert_eq!(itc.buffered(D), Some(2));

    // Exactly three DataReady reached the downstream in total.
    let to_d = drain(mailboxes.get_mut(&D).ok_or("missing mailbox")?);
    assert_eq!(to_d.len(), 3);
    assert!(to_d
        .iter()
        .all(|msg| *msg == Message::new(MessageKind::DataReady, ME)));

    Ok(())
}

/// A single message arrival may trigger several consecutive runs when
/// credits piled up while the output buffer was full.
#[test]
fn one_ack_flushes_only_one_backlogged_run() -> TestResult {
    let (routes, _mailboxes) = Routes::build([U, ME, D]);
    let node = stage_node(ME, vec![U], vec![(D, 1)]);
    let runner = Arc::new(CountingRunner::default());
    let mut itc = ComputeInterceptor::new(&node, None, routes.outbox(ME), runner.clone());

    // Capacity 1: the first input runs, the next three queue up as credits.
    for _ in 0..4 {
        itc.handle(Message::new(MessageKind::DataReady, U))?;
    }
    assert_eq!(runner.count(), 1);
    assert_eq!(itc.ready_count(U), Some(3));

    // Each ack frees one slot, which admits exactly one queued run.
    itc.handle(Message::new(MessageKind::DataUseless, D))?;
    assert_eq!(runner.count(), 2);
    assert_eq!(itc.ready_count(U), Some(2));

    itc.handle(Message::new(MessageKind::DataUseless, D))?;
    itc.handle(Message::new(MessageKind::DataUseless, D))?;
    assert_eq!(runner.count(), 4);
    assert_eq!(itc.ready_count(U), Some(0));
    assert_eq!(itc.buffered(D), Some(1));

    Ok(())
}

/// Conservation: DataReady sent to the downstream minus DataUseless
/// received from it always equals the downstream's `used`, and DataReady
/// received from the upstream minus local runs equals its `ready`.
#[test]
fn credit_and_buffer_conservation() -> TestResult {
    let (routes, mut mailboxes) = Routes::build([U, ME, D]);
    let node = stage_node(ME, vec![U], vec![(D, 2)]);
    let runner = Arc::new(CountingRunner::default());
    let mut itc = ComputeInterceptor::new(&node, None, routes.outbox(ME), runner.clone());

    let script = [
        Message::new(MessageKind::DataReady, U),
        Message::new(MessageKind::DataReady, U),
        Message::new(MessageKind::DataReady, U),
        Message::new(MessageKind::DataUseless, D),
        Message::new(MessageKind::DataReady, U),
        Message::new(MessageKind::DataUseless, D),
        Message::new(MessageKind::DataUseless, D),
        Message::new(MessageKind::DataUseless, D),
    ];

    let mut ready_from_u: u64 = 0;
    let mut acks_from_d: u64 = 0;
    let mut sent_to_d: u64 = 0;

    for msg in script {
        match msg.kind {
            MessageKind::DataReady => ready_from_u += 1,
            MessageKind::DataUseless => acks_from_d += 1,
        }
        itc.handle(msg)?;

        sent_to_d += drain(mailboxes.get_mut(&D).ok_or("missing mailbox")?).len() as u64;

        assert_eq!(
            itc.buffered(D),
            Some(sent_to_d - acks_from_d),
            "buffer occupancy must equal sends minus acks"
        );
        assert_eq!(
            itc.ready_count(U),
            Some(ready_from_u - runner.count()),
            "ready count must equal signals minus consumed runs"
        );
    }

    // Everything produced was eventually consumed.
    assert_eq!(runner.count(), 4);
    assert_eq!(itc.buffered(D), Some(0));
    assert_eq!(itc.ready_count(U), Some(0));

    Ok(())
}
