// src/interceptor/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::carrier::Outbox;
use crate::graph::TaskNode;
use crate::interceptor::{ComputeInterceptor, Interceptor};
use crate::ops::StageRunner;

/// Everything a factory needs to construct one interceptor.
#[derive(Clone)]
pub struct InterceptorSpawn {
    pub node: TaskNode,
    /// Upstream credit cap; `None` = unbounded.
    pub max_ready: Option<u64>,
    pub outbox: Outbox,
    pub runner: Arc<dyn StageRunner>,
}

/// Constructor for one interceptor variant.
pub type InterceptorFactory = fn(InterceptorSpawn) -> Box<dyn Interceptor>;

/// Mapping from variant name to constructor.
///
/// Populated once at startup, before any pipeline is wired, and read-only
/// afterwards. The config's per-stage `kind` field is resolved against it.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, InterceptorFactory>,
}

impl Registry {
    /// Empty registry, for callers that want full control over variants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in variants registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("compute", |spawn| {
            Box::new(ComputeInterceptor::new(
                &spawn.node,
                spawn.max_ready,
                spawn.outbox,
                spawn.runner,
            ))
        });
        registry
    }

    pub fn register(&mut self, kind: &str, factory: InterceptorFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Instantiate the variant registered under `kind`.
    pub fn create(&self, kind: &str, spawn: InterceptorSpawn) -> Result<Box<dyn Interceptor>> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            anyhow!(
                "stage '{}' requests unknown interceptor kind '{}'",
                spawn.node.name,
                kind
            )
        })?;
        Ok(factory(spawn))
    }
}
