// src/graph/topology.rs

use std::collections::BTreeMap;
use std::fmt;

use crate::config::model::ConfigFile;

/// Process-wide-unique identity of a pipeline node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reserved identity of the virtual driver endpoint.
///
/// The driver plays the upstream of every source stage and the downstream
/// of every sink stage, so the compute interceptor never needs to special
/// case roots or leaves of the DAG.
pub const DRIVER_NODE_ID: NodeId = NodeId(0);

/// One downstream slot of a node: the neighbor's id plus the depth of that
/// neighbor's input queue (how many unacknowledged outputs may be in
/// flight towards it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downstream {
    pub id: NodeId,
    pub capacity: u64,
}

/// Static description of one pipeline stage: identity, interceptor kind,
/// and its upstream/downstream connectivity.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub id: NodeId,
    pub name: String,
    /// Interceptor variant name, resolved through the registry.
    pub kind: String,
    pub upstream: Vec<NodeId>,
    pub downstream: Vec<Downstream>,
}

/// The whole pipeline topology, keyed by [`NodeId`].
///
/// Stage names are assigned dense ids starting at 1 in deterministic
/// (lexicographic) order; id 0 is the driver.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: BTreeMap<NodeId, TaskNode>,
    ids_by_name: BTreeMap<String, NodeId>,
    sources: Vec<NodeId>,
    sinks: Vec<NodeId>,
}

impl Topology {
    /// Build a topology from a validated [`ConfigFile`].
    ///
    /// Assumes that all `after` references are valid and the graph is
    /// acyclic; both are checked in `config::validate`.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let default_capacity = cfg.pipeline.buffer_capacity;

        // First pass: assign ids in deterministic order.
        let mut ids_by_name = BTreeMap::new();
        for (idx, name) in cfg.stage.keys().enumerate() {
            ids_by_name.insert(name.clone(), NodeId(idx as u64 + 1));
        }

        // Second pass: nodes with upstream edges from `after`.
        let mut nodes: BTreeMap<NodeId, TaskNode> = BTreeMap::new();
        for (name, stage) in cfg.stage.iter() {
            let id = ids_by_name[name];
            let upstream: Vec<NodeId> = stage
                .after
                .iter()
                .map(|dep| ids_by_name[dep])
                .collect();
            nodes.insert(
                id,
                TaskNode {
                    id,
                    name: name.clone(),
                    kind: stage.kind.clone(),
                    upstream,
                    downstream: Vec::new(),
                },
            );
        }

        // Third pass: populate downstream slots from the reverse edges. The
        // slot capacity is the *downstream* node's input queue depth.
        for (name, stage) in cfg.stage.iter() {
            let id = ids_by_name[name];
            let capacity = stage.effective_buffer_capacity(default_capacity);
            for dep in stage.after.iter() {
                let dep_id = ids_by_name[dep];
                if let Some(dep_node) = nodes.get_mut(&dep_id) {
                    dep_node.downstream.push(Downstream { id, capacity });
                }
            }
        }

        // Final pass: inject driver edges so sources are fed and sinks are
        // drained by the virtual endpoint.
        let mut sources = Vec::new();
        let mut sinks = Vec::new();
        for node in nodes.values_mut() {
            if node.upstream.is_empty() {
                node.upstream.push(DRIVER_NODE_ID);
                sources.push(node.id);
            }
            if node.downstream.is_empty() {
                node.downstream.push(Downstream {
                    id: DRIVER_NODE_ID,
                    capacity: default_capacity,
                });
                sinks.push(node.id);
            }
        }

        Self {
            nodes,
            ids_by_name,
            sources,
            sinks,
        }
    }

    /// All stage nodes, in id order (driver excluded).
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.ids_by_name.get(name).copied()
    }

    /// Stages with no configured upstream (fed by the driver).
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Stages with no configured downstream (drained by the driver).
    pub fn sinks(&self) -> &[NodeId] {
        &self.sinks
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
