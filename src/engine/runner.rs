// src/engine/runner.rs

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dag::ExecutionState;
use crate::errors::{DagrunError, Result};
use crate::exec::TaskHandle;
use crate::task::{TaskId, TaskUnit};

use super::manager::ExecutionManager;

/// Default upper bound on how long an idle cycle waits for a task to finish.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    /// How long to block when a cycle neither submitted a task nor saw one
    /// finish. Pooled executors cut the wait short as soon as any of their
    /// tasks completes. `Duration::ZERO` never blocks.
    pub idle_wait: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}

/// Drives a graph to completion.
///
/// Each cycle pulls at most one ready task from the execution state, submits
/// it to the executor the manager picks (or hands it back when that executor
/// is full), then polls every in-flight handle and writes its state back.
/// In-flight handles are owned here, keyed by task id, and dropped as soon
/// as they report a terminal state.
///
/// The loop is synchronous and must not be driven from inside an async
/// runtime: pool executors own runtimes of their own.
pub struct GraphRunner<S: ExecutionState> {
    execution_state: S,
    execution_manager: ExecutionManager,
    task_handles: HashMap<TaskId, Box<dyn TaskHandle>>,
    options: RunnerOptions,
}

impl<S: ExecutionState> fmt::Debug for GraphRunner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphRunner")
            .field("execution_manager", &self.execution_manager)
            .field("in_flight", &self.task_handles.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: ExecutionState> GraphRunner<S> {
    pub fn new(execution_state: S, execution_manager: ExecutionManager) -> Self {
        Self {
            execution_state,
            execution_manager,
            task_handles: HashMap::new(),
            options: RunnerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn execution_state(&self) -> &S {
        &self.execution_state
    }

    pub fn execution_manager(&self) -> &ExecutionManager {
        &self.execution_manager
    }

    /// Give the execution state back, to read per-task outcomes.
    pub fn into_execution_state(self) -> S {
        self.execution_state
    }

    /// Number of submitted tasks that have not reported a terminal state.
    pub fn in_flight(&self) -> usize {
        self.task_handles.len()
    }

    /// Blocking call: run until the execution state reports a terminal
    /// graph state.
    ///
    /// Task failures never surface here; they end up in the execution state.
    /// Lifecycle and routing errors abort the run. Executors are finalized
    /// whenever `init` succeeded, even if the loop errored or panicked; a
    /// panic is re-raised after finalizing.
    pub fn run_until_complete(&mut self) -> Result<()> {
        self.execution_manager.init()?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive()));
        let finalized = self.execution_manager.finalize();

        match outcome {
            Ok(outcome) => outcome?,
            Err(payload) => panic::resume_unwind(payload),
        }
        finalized
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            let graph_state = self.execution_state.graph_state();
            if graph_state.is_terminal() {
                self.execution_manager.sink().graph_finished(graph_state);
                return Ok(());
            }

            let mut progressed = false;

            if let Some(task) = self.execution_state.release_next_task() {
                progressed |= self.submit_or_reject(task)?;
            }

            // Poll every cycle, so running tasks make progress even when
            // nothing new was ready.
            progressed |= self.reconcile_in_flight() > 0;

            if !progressed && !self.options.idle_wait.is_zero() {
                self.execution_manager
                    .wait_for_progress(self.options.idle_wait);
            }
        }
    }

    /// Returns `true` if the task was submitted.
    fn submit_or_reject(&mut self, task: Arc<TaskUnit>) -> Result<bool> {
        let executor_id = self.execution_manager.get_executor_for_task(&task)?;
        let executor = self.execution_manager.executor_mut(executor_id)?;

        // The execution state released an id whose handle is still live.
        if self.task_handles.contains_key(task.task_id()) {
            warn!(task = %task.task_id(), "task released again while in flight");
            return Err(DagrunError::DuplicateSubmission {
                task: task.task_id().to_string(),
                executor: executor.name().to_string(),
            });
        }

        if executor.can_submit_task() {
            debug!(
                task = %task.task_id(),
                executor = %executor.name(),
                "submitting task"
            );
            let handle = executor.submit_task(Arc::clone(&task))?;
            self.task_handles.insert(task.task_id().to_string(), handle);
            Ok(true)
        } else {
            let executor_name = executor.name().to_string();
            self.execution_manager
                .sink()
                .task_rejected(task.task_id(), &executor_name);
            self.execution_state.reject_task(task);
            Ok(false)
        }
    }

    /// Push the current state of every in-flight task into the execution
    /// state and drop the handles that are done. Returns how many finished.
    fn reconcile_in_flight(&mut self) -> usize {
        let before = self.task_handles.len();
        let execution_state = &mut self.execution_state;

        self.task_handles.retain(|task_id, handle| {
            let state = handle.state();
            let result = handle.result().cloned();
            execution_state.update_task_state(task_id, state, result);

            if state.is_terminal() {
                info!(task = %task_id, %state, "task reached terminal state");
                false
            } else {
                true
            }
        });

        before - self.task_handles.len()
    }
}
