// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{DagrunError, Result};
use crate::task::TaskId;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskId>,
}

/// In-memory task DAG keyed by task id.
///
/// Construction rejects unknown dependencies, self-dependencies and cycles,
/// so the rest of the crate can treat the adjacency lists as trusted.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<TaskId, DagNode>,
}

impl TaskGraph {
    /// Build a DAG from `(task, after)` pairs.
    pub fn new<'a, I>(tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [TaskId])>,
    {
        let tasks: Vec<(&str, &[TaskId])> = tasks.into_iter().collect();
        let mut nodes: HashMap<TaskId, DagNode> = HashMap::new();

        // First pass: create nodes with their dependency lists.
        for (name, after) in &tasks {
            if nodes.contains_key(*name) {
                return Err(DagrunError::ConfigError(format!(
                    "task '{}' is defined more than once",
                    name
                )));
            }
            nodes.insert(
                name.to_string(),
                DagNode {
                    deps: after.to_vec(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: check references and populate dependents.
        for (name, after) in &tasks {
            for dep in after.iter() {
                if dep.as_str() == *name {
                    return Err(DagrunError::ConfigError(format!(
                        "task '{}' cannot depend on itself in `after`",
                        name
                    )));
                }
                match nodes.get_mut(dep) {
                    Some(dep_node) => dep_node.dependents.push(name.to_string()),
                    None => {
                        return Err(DagrunError::ConfigError(format!(
                            "task '{}' has unknown dependency '{}' in `after`",
                            name, dep
                        )));
                    }
                }
            }
        }

        ensure_acyclic(tasks.iter().copied())?;

        Ok(Self { nodes })
    }

    pub fn contains(&self, task: &str) -> bool {
        self.nodes.contains_key(task)
    }

    /// Immediate dependencies of a task (the tasks listed in its `after`).
    pub fn dependencies_of(&self, name: &str) -> &[TaskId] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one in their `after`).
    pub fn dependents_of(&self, name: &str) -> &[TaskId] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

/// Fail with [`DagrunError::DagCycle`] if the `(task, after)` pairs contain
/// a cycle.
pub fn ensure_acyclic<'a, I>(tasks: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a [TaskId])>,
{
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for (name, after) in tasks {
        graph.add_node(name);
        for dep in after {
            graph.add_edge(dep.as_str(), name, ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DagrunError::DagCycle(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}
