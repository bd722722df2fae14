// src/engine/mod.rs

//! Orchestration engine for dagrun.
//!
//! - [`manager`] owns the executors, starts and stops them, and routes each
//!   task to one of them.
//! - [`runner`] is the driver loop that pulls ready tasks from an
//!   [`ExecutionState`](crate::dag::ExecutionState), submits them through the
//!   manager and writes task outcomes back until the graph is done.

pub mod manager;
pub mod runner;

pub use manager::{
    DEFAULT_REMOTE_MAX_TASKS, DefaultRouting, ExecutionManager, ExecutorId, RoutingPolicy,
};
pub use runner::{DEFAULT_IDLE_WAIT, GraphRunner, RunnerOptions};
