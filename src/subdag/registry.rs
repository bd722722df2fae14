// src/subdag/registry.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::subdag::{NodeBodies, SubdagRunner, execute_nodes};
use crate::task::{Node, NodeAdapter, Value, ValueMap};

/// Node body: receives its dependencies by name.
pub type NodeFn = Arc<dyn Fn(&ValueMap) -> Result<Value> + Send + Sync>;

/// In-process subdag runner backed by Rust closures.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, NodeFn>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the body for `name`.
    pub fn register<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ValueMap) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl NodeBodies for FunctionRegistry {
    fn call(&self, node: &Node, kwargs: &ValueMap) -> Result<Value> {
        let f = self
            .functions
            .get(&node.name)
            .ok_or_else(|| anyhow!("no function registered for node '{}'", node.name))?;
        f(kwargs)
    }
}

impl SubdagRunner for FunctionRegistry {
    fn execute(
        &self,
        nodes: &[Node],
        inputs: &ValueMap,
        adapter: NodeAdapter,
        overrides: &ValueMap,
    ) -> Result<ValueMap> {
        execute_nodes(self, nodes, inputs, adapter, overrides)
    }
}
