// src/task/unit.rs

//! The immutable unit of schedulable work.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Dynamically typed value flowing between nodes.
pub type Value = serde_json::Value;

/// Named values: inputs, overrides and node outputs.
pub type ValueMap = BTreeMap<String, Value>;

/// Why a group of nodes was bundled into one task. Drives executor routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeGroupPurpose {
    /// A single node, cheap enough to run inline.
    ExecuteSingle,
    /// A block of nodes executed together.
    ExecuteBlock,
    /// A node that fans out into a dynamic number of downstream tasks.
    ExpandUnordered,
    /// A node that collects the results of an expansion.
    Gather,
}

impl Default for NodeGroupPurpose {
    fn default() -> Self {
        NodeGroupPurpose::ExecuteSingle
    }
}

impl fmt::Display for NodeGroupPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeGroupPurpose::ExecuteSingle => "execute_single",
            NodeGroupPurpose::ExecuteBlock => "execute_block",
            NodeGroupPurpose::ExpandUnordered => "expand_unordered",
            NodeGroupPurpose::Gather => "gather",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeGroupPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "execute_single" => Ok(NodeGroupPurpose::ExecuteSingle),
            "execute_block" => Ok(NodeGroupPurpose::ExecuteBlock),
            "expand_unordered" => Ok(NodeGroupPurpose::ExpandUnordered),
            "gather" => Ok(NodeGroupPurpose::Gather),
            other => Err(format!(
                "invalid purpose: {other} (expected \"execute_single\", \"execute_block\", \"expand_unordered\" or \"gather\")"
            )),
        }
    }
}

/// How a node body is invoked by the subdag runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAdapter {
    /// Call the node body as-is.
    Direct,
    /// Call the node body inside a span and log how long it took.
    Timed,
}

impl Default for NodeAdapter {
    fn default() -> Self {
        NodeAdapter::Direct
    }
}

/// One node of the graph, identified by name.
///
/// The node body is resolved by name inside the subdag runner; the task unit
/// only carries the wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Names of the values this node consumes.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Immutable description of one schedulable piece of work.
///
/// Built once by the graph state and shared as `Arc<TaskUnit>` from then on;
/// nothing in the execution core mutates it. A rejected unit goes back to the
/// graph state as the very same `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUnit {
    task_id: TaskId,
    purpose: NodeGroupPurpose,
    nodes: Vec<Node>,
    #[serde(default)]
    dynamic_inputs: ValueMap,
    #[serde(default)]
    overrides: ValueMap,
    adapters: Vec<NodeAdapter>,
}

impl TaskUnit {
    /// New unit with no inputs, no overrides and the direct adapter.
    pub fn new(task_id: impl Into<TaskId>, purpose: NodeGroupPurpose, nodes: Vec<Node>) -> Self {
        Self {
            task_id: task_id.into(),
            purpose,
            nodes,
            dynamic_inputs: ValueMap::new(),
            overrides: ValueMap::new(),
            adapters: vec![NodeAdapter::Direct],
        }
    }

    pub fn with_dynamic_inputs(mut self, inputs: ValueMap) -> Self {
        self.dynamic_inputs = inputs;
        self
    }

    pub fn with_overrides(mut self, overrides: ValueMap) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_adapters(mut self, adapters: Vec<NodeAdapter>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn purpose(&self) -> NodeGroupPurpose {
        self.purpose
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn dynamic_inputs(&self) -> &ValueMap {
        &self.dynamic_inputs
    }

    pub fn overrides(&self) -> &ValueMap {
        &self.overrides
    }

    pub fn adapters(&self) -> &[NodeAdapter] {
        &self.adapters
    }

    /// The adapter that actually runs this unit.
    ///
    /// Only the first adapter is honoured; composing several is not supported.
    pub fn primary_adapter(&self) -> Option<NodeAdapter> {
        self.adapters.first().copied()
    }

    /// Dynamic inputs unioned with explicit overrides; overrides win.
    pub fn merged_overrides(&self) -> ValueMap {
        let mut merged = self.dynamic_inputs.clone();
        merged.extend(
            self.overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        merged
    }
}
