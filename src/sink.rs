// src/sink.rs

//! Observability sink injected into executors and the graph runner.
//!
//! Components never log task outcomes through a process-wide handle of their
//! own; they report to an `EventSink` they were given at construction. The
//! default [`TracingSink`] forwards everything to `tracing`, and tests can
//! swap in a recording sink to assert on failures.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::task::GraphState;

pub trait EventSink: Send + Sync + fmt::Debug {
    /// A task body failed. Called exactly once per failed task.
    fn task_failed(&self, task_id: &str, error: &anyhow::Error);

    /// A ready task was handed back to the graph state for lack of capacity.
    fn task_rejected(&self, task_id: &str, executor: &str);

    /// The graph reached a terminal state.
    fn graph_finished(&self, state: GraphState);
}

/// Sink that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn task_failed(&self, task_id: &str, error: &anyhow::Error) {
        error!(task = %task_id, error = ?error, "task failed");
    }

    fn task_rejected(&self, task_id: &str, executor: &str) {
        debug!(
            task = %task_id,
            executor,
            "executor at capacity; task handed back to graph state"
        );
    }

    fn graph_finished(&self, state: GraphState) {
        info!(%state, "graph is done");
    }
}

pub type SharedSink = Arc<dyn EventSink>;

pub fn default_sink() -> SharedSink {
    Arc::new(TracingSink)
}
