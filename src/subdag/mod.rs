// src/subdag/mod.rs

//! Subdag execution: running a subset of graph nodes with given inputs.
//!
//! The execution core treats this as an opaque, possibly slow, possibly
//! failing call behind [`SubdagRunner`]. Two runners ship with the crate:
//!
//! - [`registry::FunctionRegistry`] resolves node bodies to Rust closures.
//! - [`shell::ShellNodes`] resolves node bodies to shell commands; this is
//!   what the `dagrun` binary and its process-pool workers use.

pub mod registry;
pub mod shell;

use std::time::Instant;

use anyhow::{Result, anyhow};
use tracing::{debug, debug_span};

use crate::task::{Node, NodeAdapter, Value, ValueMap};

pub use registry::FunctionRegistry;
pub use shell::ShellNodes;

/// Runs a set of nodes to completion and returns their outputs.
pub trait SubdagRunner: Send + Sync {
    /// Execute `nodes` in order.
    ///
    /// `overrides` short-circuit nodes of the same name and also serve as
    /// values for dependencies, next to `inputs`.
    fn execute(
        &self,
        nodes: &[Node],
        inputs: &ValueMap,
        adapter: NodeAdapter,
        overrides: &ValueMap,
    ) -> Result<ValueMap>;
}

/// Lookup of node bodies by node name.
pub trait NodeBodies {
    fn call(&self, node: &Node, kwargs: &ValueMap) -> Result<Value>;
}

/// Walk `nodes` in order and evaluate each one through `adapter`.
///
/// Dependencies resolve against values computed earlier in this walk first,
/// then `overrides`, then `inputs`. The returned map has one entry per node.
pub fn execute_nodes<B>(
    bodies: &B,
    nodes: &[Node],
    inputs: &ValueMap,
    adapter: NodeAdapter,
    overrides: &ValueMap,
) -> Result<ValueMap>
where
    B: NodeBodies + ?Sized,
{
    let mut computed = ValueMap::new();

    for node in nodes {
        if let Some(value) = overrides.get(&node.name) {
            computed.insert(node.name.clone(), value.clone());
            continue;
        }

        let mut kwargs = ValueMap::new();
        for dep in &node.dependencies {
            let value = computed
                .get(dep)
                .or_else(|| overrides.get(dep))
                .or_else(|| inputs.get(dep))
                .ok_or_else(|| {
                    anyhow!("node '{}' is missing a value for dependency '{}'", node.name, dep)
                })?;
            kwargs.insert(dep.clone(), value.clone());
        }

        let value = call_with_adapter(bodies, node, &kwargs, adapter)?;
        computed.insert(node.name.clone(), value);
    }

    Ok(computed)
}

fn call_with_adapter<B>(bodies: &B, node: &Node, kwargs: &ValueMap, adapter: NodeAdapter) -> Result<Value>
where
    B: NodeBodies + ?Sized,
{
    match adapter {
        NodeAdapter::Direct => bodies.call(node, kwargs),
        NodeAdapter::Timed => {
            let span = debug_span!("node", node = %node.name);
            let _guard = span.enter();
            let start = Instant::now();
            let res = bodies.call(node, kwargs);
            debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                ok = res.is_ok(),
                "node finished"
            );
            res
        }
    }
}
