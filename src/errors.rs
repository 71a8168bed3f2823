// src/errors.rs

//! Crate-wide error types.
//!
//! [`ProtocolError`] covers flow-control invariant violations: an unknown
//! neighbor referenced by a message, or a credit/buffer counter pushed past
//! its bound. These indicate a malformed topology or a violated protocol
//! invariant, never a transient condition, so they are terminal for the
//! pipeline run — they must not be clamped or retried.
//!
//! Everything else (config loading, wiring, top-level run) uses `anyhow`.

use crate::graph::NodeId;

pub use anyhow::{Error, Result};

/// Fatal scheduling errors raised by interceptors and the carrier.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A DataReady arrived from a node that is not a registered upstream.
    #[error("node {node}: DataReady from {src}, which is not an upstream")]
    UnknownUpstream { node: NodeId, src: NodeId },

    /// A DataUseless arrived from a node that is not a registered downstream.
    #[error("node {node}: DataUseless from {src}, which is not a downstream")]
    UnknownDownstream { node: NodeId, src: NodeId },

    /// Upstream ready count would exceed its credit cap.
    #[error("node {node}: ready count for upstream {src} would exceed max_ready={max_ready}")]
    ReadyOverflow {
        node: NodeId,
        src: NodeId,
        max_ready: u64,
    },

    /// Upstream ready count would drop below zero.
    #[error("node {node}: ready count for upstream {src} would go negative")]
    ReadyUnderflow { node: NodeId, src: NodeId },

    /// Downstream buffer would exceed its capacity.
    #[error("node {node}: buffer for downstream {dst} would exceed capacity={capacity}")]
    BufferOverflow {
        node: NodeId,
        dst: NodeId,
        capacity: u64,
    },

    /// Downstream buffer would drop below zero.
    #[error("node {node}: buffer for downstream {dst} would go negative")]
    BufferUnderflow { node: NodeId, dst: NodeId },

    /// A message was addressed to a node the routing table does not know.
    #[error("no route to node {target}")]
    Unroutable { target: NodeId },

    /// The target's mailbox is gone. Expected while the pipeline is shutting
    /// down; fatal at any other time.
    #[error("mailbox of node {target} is closed")]
    Disconnected { target: NodeId },

    /// The stage's own work failed; the scheduler treats this as a fatal
    /// abort of the run.
    #[error("stage '{stage}' (node {node}) failed: {message}")]
    StageFailed {
        node: NodeId,
        stage: String,
        message: String,
    },
}
