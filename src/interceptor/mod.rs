// src/interceptor/mod.rs

//! Interceptors: the actor-like scheduling units of the pipeline.
//!
//! Each interceptor owns one stage's flow-control bookkeeping and handles
//! the messages addressed to it. All cross-interceptor effects travel as
//! [`Message`]s through the carrier; no scheduling state is shared.
//!
//! - [`message`] defines the flow-control envelope.
//! - [`compute`] is the concrete scheduling unit for ordinary stages.
//! - [`registry`] maps variant names to constructors so graph wiring can
//!   instantiate the right interceptor kind per node.

pub mod compute;
pub mod message;
pub mod registry;

pub use compute::ComputeInterceptor;
pub use message::{Message, MessageKind};
pub use registry::{InterceptorFactory, InterceptorSpawn, Registry};

use crate::errors::ProtocolError;
use crate::graph::NodeId;

/// An addressable scheduling unit.
///
/// The carrier guarantees that `handle` is never invoked concurrently with
/// itself for a given interceptor, and that messages from any single peer
/// arrive in the order they were sent. Handlers are synchronous and never
/// block; runnability is recomputed from the bookkeeping tables on every
/// message.
pub trait Interceptor: Send {
    fn node_id(&self) -> NodeId;

    /// Apply one inbound message. A returned [`ProtocolError`] is
    /// unrecoverable and terminates this interceptor's mailbox loop.
    fn handle(&mut self, msg: Message) -> Result<(), ProtocolError>;

    /// Attempt to advance the owned stage as far as its bookkeeping
    /// allows. Must be bounded and non-blocking.
    fn run(&mut self) -> Result<(), ProtocolError>;
}
