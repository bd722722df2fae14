// src/exec/pool.rs

//! Bounded pool executor, generic over how a task is actually run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{DagrunError, Result};
use crate::exec::executor::{ExecutorContext, TaskExecutor};
use crate::exec::handle::{ChannelTask, TaskHandle};
use crate::task::{TaskId, TaskUnit, ValueMap};

/// How long `finalize` waits for in-flight work before giving up on it.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a pooled task delivers its outcome.
///
/// Sending also wakes the graph runner so it can observe the transition
/// without spinning.
pub struct TaskReply {
    tx: oneshot::Sender<anyhow::Result<ValueMap>>,
    ctx: ExecutorContext,
}

impl TaskReply {
    pub fn send(self, result: anyhow::Result<ValueMap>) {
        // The handle may already be gone (e.g. the runner bailed out); the
        // result has nowhere to go then.
        let _ = self.tx.send(result);
        self.ctx.notify();
    }
}

/// Concurrency substrate behind a [`PoolExecutor`].
pub trait PoolBackend: Send {
    /// Short label for logs ("threads", "processes", ...).
    fn kind(&self) -> &'static str;

    /// Build the pool that will run at most `max_tasks` tasks at once.
    fn create_pool(&self, max_tasks: usize) -> std::io::Result<Runtime>;

    /// Start running `unit` on `pool`. The spawned work must eventually call
    /// `reply.send`.
    fn spawn(&self, pool: &Runtime, unit: Arc<TaskUnit>, reply: TaskReply) -> JoinHandle<()>;
}

/// Executor that runs tasks on a fixed-size pool and admits at most
/// `max_tasks` unfinished tasks at a time.
///
/// In-flight work is tracked per task id and pruned as soon as it finishes,
/// before every admission check.
pub struct PoolExecutor<B: PoolBackend> {
    name: String,
    backend: B,
    max_tasks: usize,
    ctx: ExecutorContext,
    pool: Option<Runtime>,
    active: HashMap<TaskId, JoinHandle<()>>,
}

impl<B: PoolBackend> fmt::Debug for PoolExecutor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolExecutor")
            .field("name", &self.name)
            .field("kind", &self.backend.kind())
            .field("max_tasks", &self.max_tasks)
            .field("initialized", &self.pool.is_some())
            .field("in_flight", &self.active.len())
            .finish_non_exhaustive()
    }
}

impl<B: PoolBackend> PoolExecutor<B> {
    /// `max_tasks` is clamped to at least one.
    pub fn with_backend(backend: B, max_tasks: usize) -> Self {
        Self {
            name: backend.kind().to_string(),
            backend,
            max_tasks: max_tasks.max(1),
            ctx: ExecutorContext::default(),
            pool: None,
            active: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    /// Number of submitted tasks whose work has not finished yet.
    pub fn in_flight(&mut self) -> usize {
        self.prune_finished();
        self.active.len()
    }

    fn prune_finished(&mut self) {
        self.active.retain(|_, handle| !handle.is_finished());
    }
}

impl<B: PoolBackend> TaskExecutor for PoolExecutor<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, ctx: ExecutorContext) {
        self.ctx = ctx;
    }

    fn init(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Err(DagrunError::AlreadyInitialized(self.name.clone()));
        }

        let pool = self.backend.create_pool(self.max_tasks)?;
        info!(
            executor = %self.name,
            kind = self.backend.kind(),
            max_tasks = self.max_tasks,
            "executor pool started"
        );
        self.pool = Some(pool);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let pool = self
            .pool
            .take()
            .ok_or_else(|| DagrunError::NotInitialized(self.name.clone()))?;

        self.prune_finished();
        if !self.active.is_empty() {
            warn!(
                executor = %self.name,
                in_flight = self.active.len(),
                "shutting down pool with tasks still in flight"
            );
        }
        self.active.clear();

        pool.shutdown_timeout(DEFAULT_SHUTDOWN_TIMEOUT);
        info!(executor = %self.name, "executor pool shut down");
        Ok(())
    }

    fn can_submit_task(&mut self) -> bool {
        if self.pool.is_none() {
            return false;
        }
        self.prune_finished();
        self.active.len() < self.max_tasks
    }

    fn submit_task(&mut self, unit: Arc<TaskUnit>) -> Result<Box<dyn TaskHandle>> {
        self.prune_finished();

        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| DagrunError::NotInitialized(self.name.clone()))?;

        if self.active.len() >= self.max_tasks {
            return Err(DagrunError::AtCapacity {
                executor: self.name.clone(),
                max_tasks: self.max_tasks,
            });
        }

        let task_id = unit.task_id().to_string();
        if self.active.contains_key(&task_id) {
            return Err(DagrunError::DuplicateSubmission {
                task: task_id,
                executor: self.name.clone(),
            });
        }

        let (tx, rx) = oneshot::channel();
        let reply = TaskReply {
            tx,
            ctx: self.ctx.clone(),
        };

        debug!(
            task = %task_id,
            executor = %self.name,
            in_flight = self.active.len() + 1,
            "submitting task to pool"
        );

        let join = self.backend.spawn(pool, unit, reply);
        self.active.insert(task_id.clone(), join);

        Ok(Box::new(ChannelTask::new(task_id, rx, self.ctx.sink.clone())))
    }
}
