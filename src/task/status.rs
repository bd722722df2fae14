// src/task/status.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single submitted task.
///
/// `Pending -> Running -> {Successful | Failed}`. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Successful,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Successful | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Successful => "successful",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Aggregate state of the whole graph, as reported by the graph state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphState {
    Running,
    Successful,
    Failed,
}

impl GraphState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GraphState::Successful | GraphState::Failed)
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GraphState::Running => "running",
            GraphState::Successful => "successful",
            GraphState::Failed => "failed",
        };
        f.write_str(s)
    }
}
