// src/carrier/mod.rs

//! Message carrier: mailboxes, routing, and per-interceptor message loops.
//!
//! Every node gets an unbounded tokio mpsc mailbox. Unbounded is safe here
//! because the flow-control protocol itself bounds the number of in-flight
//! messages per sender/receiver pair (credits and buffer capacities), and
//! it keeps [`Outbox::send`] synchronous so interceptor handlers never
//! suspend.
//!
//! tokio mpsc preserves per-sender FIFO order, and each interceptor is
//! driven by exactly one [`mailbox_loop`] task, which together provide the
//! delivery guarantees the scheduling protocol assumes: in-order delivery
//! per pair, no concurrent re-entry into one interceptor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::errors::ProtocolError;
use crate::graph::NodeId;
use crate::interceptor::{Interceptor, Message, MessageKind};

/// Receiving end of one node's mailbox.
pub type Mailbox = mpsc::UnboundedReceiver<Message>;

/// Immutable routing table: node id to mailbox sender.
///
/// Built once, before any interceptor is constructed, and read-only
/// afterwards, so sends need no locking.
#[derive(Debug, Clone)]
pub struct Routes {
    inner: Arc<HashMap<NodeId, mpsc::UnboundedSender<Message>>>,
}

impl Routes {
    /// Create a mailbox per node id and the routing table over all of them.
    pub fn build(ids: impl IntoIterator<Item = NodeId>) -> (Routes, HashMap<NodeId, Mailbox>) {
        let mut senders = HashMap::new();
        let mut mailboxes = HashMap::new();

        for id in ids {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(id, tx);
            mailboxes.insert(id, rx);
        }

        (
            Routes {
                inner: Arc::new(senders),
            },
            mailboxes,
        )
    }

    /// Sending handle for the node with the given identity.
    pub fn outbox(&self, src: NodeId) -> Outbox {
        Outbox {
            src,
            routes: self.clone(),
        }
    }

    fn send(&self, target: NodeId, msg: Message) -> Result<(), ProtocolError> {
        let tx = self
            .inner
            .get(&target)
            .ok_or(ProtocolError::Unroutable { target })?;

        tx.send(msg)
            .map_err(|_| ProtocolError::Disconnected { target })
    }
}

/// A node's sending handle: the `Send(target, message)` primitive.
///
/// Stamps every outgoing message with the owning node's identity.
#[derive(Debug, Clone)]
pub struct Outbox {
    src: NodeId,
    routes: Routes,
}

impl Outbox {
    pub fn src(&self) -> NodeId {
        self.src
    }

    pub fn send(&self, target: NodeId, kind: MessageKind) -> Result<(), ProtocolError> {
        debug!(src = %self.src, dst = %target, ?kind, "sending flow-control message");
        self.routes.send(target, Message::new(kind, self.src))
    }
}

/// Drive one interceptor from its mailbox until shutdown is signalled, the
/// mailbox closes, or the interceptor reports a protocol violation.
///
/// Returns the node id on a clean exit so the runtime can tell loops apart
/// when joining them.
pub async fn mailbox_loop(
    mut interceptor: Box<dyn Interceptor>,
    mut mailbox: Mailbox,
    mut shutdown: watch::Receiver<bool>,
) -> Result<NodeId, ProtocolError> {
    let node = interceptor.node_id();
    debug!(node = %node, "mailbox loop started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(node = %node, "mailbox loop stopping (shutdown)");
                    break;
                }
            }
            maybe = mailbox.recv() => {
                let Some(msg) = maybe else {
                    debug!(node = %node, "mailbox closed; stopping");
                    break;
                };

                if let Err(err) = interceptor.handle(msg) {
                    // A peer's mailbox dropping while queued messages drain
                    // is part of normal shutdown, not a violation.
                    if matches!(err, ProtocolError::Disconnected { .. }) && *shutdown.borrow() {
                        debug!(node = %node, "peer mailbox closed during shutdown; stopping");
                        break;
                    }

                    error!(node = %node, error = %err, "protocol violation; aborting interceptor");
                    return Err(err);
                }
            }
        }
    }

    Ok(node)
}
