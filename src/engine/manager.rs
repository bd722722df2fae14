// src/engine/manager.rs

//! Executor ownership, lifecycle fan-out and per-task routing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, info};

use crate::errors::{DagrunError, Result};
use crate::exec::{
    ExecutorContext, ProcessPoolExecutor, SynchronousLocalExecutor, TaskExecutor, Wakeup,
    WorkerCommand,
};
use crate::sink::{SharedSink, default_sink};
use crate::subdag::SubdagRunner;
use crate::task::{NodeGroupPurpose, TaskUnit};

/// Worker budget of the default remote executor.
pub const DEFAULT_REMOTE_MAX_TASKS: usize = 5;

/// Position of an executor inside its [`ExecutionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutorId(pub usize);

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Decides which executor runs a task.
///
/// Must be a pure function of the task: no state changes, and the same task
/// always maps to the same executor.
pub trait RoutingPolicy: Send + Sync + fmt::Debug {
    fn route(&self, task: &TaskUnit) -> Option<ExecutorId>;
}

/// Single-node tasks run locally; everything else goes to the remote
/// executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRouting {
    pub local: ExecutorId,
    pub remote: ExecutorId,
}

impl RoutingPolicy for DefaultRouting {
    fn route(&self, task: &TaskUnit) -> Option<ExecutorId> {
        match task.purpose() {
            NodeGroupPurpose::ExecuteSingle => Some(self.local),
            NodeGroupPurpose::ExecuteBlock
            | NodeGroupPurpose::ExpandUnordered
            | NodeGroupPurpose::Gather => Some(self.remote),
        }
    }
}

/// Owns a set of executors and routes each task to one of them.
///
/// `init`/`finalize` fan out in registration order and stop at the first
/// error; nothing is rolled back, so a manager whose `init` failed should be
/// dropped.
pub struct ExecutionManager {
    executors: Vec<Box<dyn TaskExecutor>>,
    policy: Box<dyn RoutingPolicy>,
    sink: SharedSink,
    wakeup: Wakeup,
    wakeup_rx: Receiver<()>,
}

impl fmt::Debug for ExecutionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.executors.iter().map(|e| e.name()).collect();
        f.debug_struct("ExecutionManager")
            .field("executors", &names)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ExecutionManager {
    /// Build a manager over `executors` (not started yet; call `init`).
    pub fn new<P>(executors: Vec<Box<dyn TaskExecutor>>, policy: P) -> Self
    where
        P: RoutingPolicy + 'static,
    {
        let (tx, wakeup_rx) = bounded(1);
        let mut manager = Self {
            executors,
            policy: Box::new(policy),
            sink: default_sink(),
            wakeup: Wakeup::new(tx),
            wakeup_rx,
        };
        manager.attach_all();
        manager
    }

    /// Manager with a local and a remote executor, routed by
    /// [`DefaultRouting`].
    pub fn with_local_and_remote(
        local_executor: Box<dyn TaskExecutor>,
        remote_executor: Box<dyn TaskExecutor>,
    ) -> Self {
        Self::new(
            vec![local_executor, remote_executor],
            DefaultRouting {
                local: ExecutorId(0),
                remote: ExecutorId(1),
            },
        )
    }

    /// Inline local executor plus a process pool of
    /// [`DEFAULT_REMOTE_MAX_TASKS`] workers started with `worker`.
    ///
    /// `runner` only drives the local executor. Remote tasks run in whatever
    /// `worker` launches, so it must resolve the same node bodies, e.g.
    /// `dagrun worker --config <path>` for the config `runner` was built from.
    pub fn default_for(runner: Arc<dyn SubdagRunner>, worker: WorkerCommand) -> Self {
        Self::with_local_and_remote(
            Box::new(SynchronousLocalExecutor::new(runner)),
            Box::new(
                ProcessPoolExecutor::new(worker, DEFAULT_REMOTE_MAX_TASKS).with_name("remote"),
            ),
        )
    }

    /// Report task outcomes to `sink` instead of the default tracing sink.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self.attach_all();
        self
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    fn attach_all(&mut self) {
        let ctx = ExecutorContext::new(self.sink.clone(), Some(self.wakeup.clone()));
        for executor in &mut self.executors {
            executor.attach(ctx.clone());
        }
    }

    pub fn init(&mut self) -> Result<()> {
        for executor in &mut self.executors {
            debug!(executor = %executor.name(), "initializing executor");
            executor.init()?;
        }
        info!(executors = self.executors.len(), "execution manager started");
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<()> {
        for executor in &mut self.executors {
            debug!(executor = %executor.name(), "finalizing executor");
            executor.finalize()?;
        }
        info!("execution manager finalized");
        Ok(())
    }

    /// Pick the executor for `task`. Pure: no state is touched.
    pub fn get_executor_for_task(&self, task: &TaskUnit) -> Result<ExecutorId> {
        match self.policy.route(task) {
            Some(id) if id.0 < self.executors.len() => Ok(id),
            _ => Err(DagrunError::NoExecutorForTask {
                task: task.task_id().to_string(),
                purpose: task.purpose().to_string(),
            }),
        }
    }

    pub fn executor(&self, id: ExecutorId) -> Result<&dyn TaskExecutor> {
        self.executors
            .get(id.0)
            .map(|e| e.as_ref())
            .ok_or(DagrunError::UnknownExecutor(id.0))
    }

    pub fn executor_mut(&mut self, id: ExecutorId) -> Result<&mut dyn TaskExecutor> {
        match self.executors.get_mut(id.0) {
            Some(executor) => Ok(executor.as_mut()),
            None => Err(DagrunError::UnknownExecutor(id.0)),
        }
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Block until some pooled task finishes or `timeout` elapses.
    ///
    /// Returns `true` if woken by a finished task.
    pub fn wait_for_progress(&self, timeout: Duration) -> bool {
        self.wakeup_rx.recv_timeout(timeout).is_ok()
    }
}
