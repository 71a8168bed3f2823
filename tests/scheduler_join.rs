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

const U1: NodeId = NodeId(1);
const U2: NodeId = NodeId(2);
const ME: NodeId = NodeId(5);
const D: NodeId = NodeId(9);

/// Scenario B: with two upstreams, a DataReady from only one of them must
/// not fire the stage; the second upstream's signal completes the join.
#[test]
fn two_upstreams_join_before_running() -> TestResult {
    let (routes, mut mailboxes) = Routes::build([U1, U2, ME, D]);
    let node = stage_node(ME, vec![U1, U2], vec![(D, 2)]);
    let runner = Arc::new(CountingRunner::default());
    let mut itc = ComputeInterceptor::new(&node, None, routes.outbox(ME), runner.clone());

    assert!(!itc.is_input_ready());

    itc.handle(Message::new(MessageKind::DataReady, U1))?;
    assert_eq!(runner.count(), 0, "one of two upstreams must not fire the stage");
    assert_eq!(itc.ready_count(U1), Some(1));
    assert_eq!(itc.ready_count(U2), Some(0));

    itc.handle(Message::new(MessageKind::DataReady, U2))?;
    assert_eq!(runner.count(), 1, "join complete; stage fires exactly once");
    assert_eq!(itc.ready_count(U1), Some(0));
    assert_eq!(itc.ready_count(U2), Some(0));
    assert_eq!(itc.buffered(D), Some(1));

    // One DataReady to the downstream, one ack to each upstream.
    let to_d = drain(mailboxes.get_mut(&D).ok_or("missing mailbox")?);
    assert_eq!(to_d, vec![Message::new(MessageKind::DataReady, ME)]);

    let to_u1 = drain(mailboxes.get_mut(&U1).ok_or("missing mailbox")?);
    assert_eq!(to_u1, vec![Message::new(MessageKind::DataUseless, ME)]);

    let to_u2 = drain(mailboxes.get_mut(&U2).ok_or("missing mailbox")?);
    assert_eq!(to_u2, vec![Message::new(MessageKind::DataUseless, ME)]);

    Ok(())
}

/// Calling run() again with no new messages must not produce additional
/// executions or sends (level-triggered, not edge-triggered).
#[test]
fn rerunning_without_new_messages_is_a_no_op() -> TestResult {
    let (routes, mut mailboxes) = Routes::build([U1, U2, ME, D]);
    let node = stage_node(ME, vec![U1, U2], vec![(D, 2)]);
    let runner = Arc::new(CountingRunner::default());
    let mut itc = ComputeInterceptor::new(&node, None, routes.outbox(ME), runner.clone());

    itc.handle(Message::new(MessageKind::DataReady, U1))?;
    itc.handle(Message::new(MessageKind::DataReady, U2))?;
    assert_eq!(runner.count(), 1);

    // Drain everything sent so far, then poke run() repeatedly.
    for mailbox in mailboxes.values_mut() {
        drain(mailbox);
    }

    itc.run()?;
    itc.run()?;
    itc.run()?;

    assert_eq!(runner.count(), 1, "no new input; run must not fire again");
    for (id, mailbox) in mailboxes.iter_mut() {
        assert!(
            drain(mailbox).is_empty(),
            "unexpected message sent to node {id}"
        );
    }

    Ok(())
}

/// A credit surplus from one upstream is not consumed until the other
/// upstream catches up, and then each join consumes one credit from each.
#[test]
fn credit_surplus_waits_for_slower_upstream() -> TestResult {
    let (routes, _mailboxes) = Routes::build([U1, U2, ME, D]);
    let node = stage_node(ME, vec![U1, U2], vec![(D, 4)]);
    let runner = Arc::new(CountingRunner::default());
    let mut itc = ComputeInterceptor::new(&node, None, routes.outbox(ME), runner.clone());

    itc.handle(Message::new(MessageKind::DataReady, U1))?;
    itc.handle(Message::new(MessageKind::DataReady, U1))?;
    itc.handle(Message::new(MessageKind::DataReady, U1))?;
    assert_eq!(runner.count(), 0);
    assert_eq!(itc.ready_count(U1), Some(3));

    itc.handle(Message::new(MessageKind::DataReady, U2))?;
    assert_eq!(runner.count(), 1);
    assert_eq!(itc.ready_count(U1), Some(2));
    assert_eq!(itc.ready_count(U2), Some(0));

    itc.handle(Message::new(MessageKind::DataReady, U2))?;
    assert_eq!(runner.count(), 2);
    assert_eq!(itc.ready_count(U1), Some(1));

    Ok(())
}
