// src/graph/mod.rs

//! Static pipeline topology.
//!
//! A [`Topology`] is built once from a validated config and is read-only
//! afterwards: node identities, upstream/downstream adjacency and input
//! queue depths never change during a run. All dynamic scheduling state
//! lives inside the interceptors.

pub mod topology;

pub use topology::{Downstream, NodeId, TaskNode, Topology, DRIVER_NODE_ID};
