// src/interceptor/message.rs

use crate::graph::NodeId;

/// Flow-control message kinds exchanged between interceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// The sender has produced one unit of input for the receiver.
    DataReady,
    /// The receiver consumed one previously sent output; the sender's
    /// buffer slot towards it is free again.
    DataUseless,
}

/// The envelope routed between interceptors.
///
/// These messages carry no payload: they are pure readiness/credit
/// signals. Actual data transfer happens on a separate channel outside
/// the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// Identity of the sending node.
    pub src: NodeId,
}

impl Message {
    pub fn new(kind: MessageKind, src: NodeId) -> Self {
        Self { kind, src }
    }
}
