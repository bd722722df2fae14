// src/exec/synchronous.rs

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use crate::errors::{DagrunError, Result};
use crate::exec::executor::{ExecutorContext, TaskExecutor};
use crate::exec::execute_task;
use crate::exec::handle::{CompletedTask, TaskHandle};
use crate::subdag::SubdagRunner;
use crate::task::TaskUnit;

/// Runs each task inline, on the caller's thread, at submit time.
///
/// Submission blocks until the task is done, so this executor can never
/// back up and always admits new work. A panicking node body fails its task
/// instead of unwinding into the graph runner.
pub struct SynchronousLocalExecutor {
    name: String,
    runner: Arc<dyn SubdagRunner>,
    ctx: ExecutorContext,
    initialized: bool,
}

impl SynchronousLocalExecutor {
    pub fn new(runner: Arc<dyn SubdagRunner>) -> Self {
        Self {
            name: "local".to_string(),
            runner,
            ctx: ExecutorContext::default(),
            initialized: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl TaskExecutor for SynchronousLocalExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, ctx: ExecutorContext) {
        self.ctx = ctx;
    }

    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(DagrunError::AlreadyInitialized(self.name.clone()));
        }
        self.initialized = true;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(DagrunError::NotInitialized(self.name.clone()));
        }
        self.initialized = false;
        Ok(())
    }

    fn can_submit_task(&mut self) -> bool {
        true
    }

    fn submit_task(&mut self, unit: Arc<TaskUnit>) -> Result<Box<dyn TaskHandle>> {
        if !self.initialized {
            return Err(DagrunError::NotInitialized(self.name.clone()));
        }

        debug!(task = %unit.task_id(), executor = %self.name, "running task inline");
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            execute_task(self.runner.as_ref(), &unit)
        }))
        .unwrap_or_else(|payload| {
            Err(anyhow!(
                "task '{}' panicked: {}",
                unit.task_id(),
                panic_message(payload.as_ref())
            ))
        });
        let handle = CompletedTask::new(unit.task_id().to_string(), result, &self.ctx.sink);
        Ok(Box::new(handle))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
