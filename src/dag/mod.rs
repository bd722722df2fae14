// src/dag/mod.rs

//! Graph state: which task is ready next, and what the graph as a whole
//! looks like.
//!
//! - [`ExecutionState`] is the contract the graph runner drives.
//! - [`graph`] holds a validated DAG of task ids.
//! - [`execution_state`] is the reference `ExecutionState` over that DAG.

pub mod execution_state;
pub mod graph;

use std::sync::Arc;

use crate::task::{GraphState, TaskState, TaskUnit, ValueMap};

pub use execution_state::{DagExecutionState, TaskSpec};
pub use graph::TaskGraph;

/// Source of ready tasks and sink of task outcomes.
///
/// Implementations own dependency ordering: the runner only pulls whatever
/// `release_next_task` offers.
pub trait ExecutionState {
    /// Aggregate state of the graph. The runner stops once it is terminal.
    fn graph_state(&self) -> GraphState;

    /// Next task that is ready to run, if any. `None` just means nothing is
    /// ready right now.
    fn release_next_task(&mut self) -> Option<Arc<TaskUnit>>;

    /// Hand back a released task that could not be admitted. It must be
    /// offered again, as the same unit, by a later `release_next_task`.
    fn reject_task(&mut self, task: Arc<TaskUnit>);

    /// Record the latest observed state (and result, once successful) of a
    /// submitted task.
    fn update_task_state(&mut self, task_id: &str, state: TaskState, result: Option<ValueMap>);
}
