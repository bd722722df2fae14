// src/exec/threads.rs

use std::fmt;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::exec::execute_task;
use crate::exec::pool::{PoolBackend, PoolExecutor, TaskReply};
use crate::subdag::SubdagRunner;
use crate::task::TaskUnit;

/// Pool of blocking threads inside this process.
///
/// Suited to I/O-bound node bodies; the task unit is shared, not copied.
pub struct ThreadBackend {
    runner: Arc<dyn SubdagRunner>,
}

impl fmt::Debug for ThreadBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadBackend").finish_non_exhaustive()
    }
}

impl ThreadBackend {
    pub fn new(runner: Arc<dyn SubdagRunner>) -> Self {
        Self { runner }
    }
}

impl PoolBackend for ThreadBackend {
    fn kind(&self) -> &'static str {
        "threads"
    }

    fn create_pool(&self, max_tasks: usize) -> std::io::Result<Runtime> {
        Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_tasks)
            .thread_name("dagrun-thread")
            .build()
    }

    fn spawn(&self, pool: &Runtime, unit: Arc<TaskUnit>, reply: TaskReply) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        pool.spawn_blocking(move || {
            let result = execute_task(runner.as_ref(), &unit);
            debug!(task = %unit.task_id(), ok = result.is_ok(), "thread worker finished task");
            reply.send(result);
        })
    }
}

/// Bounded executor backed by a thread pool.
pub type ThreadPoolExecutor = PoolExecutor<ThreadBackend>;

impl PoolExecutor<ThreadBackend> {
    pub fn new(runner: Arc<dyn SubdagRunner>, max_tasks: usize) -> Self {
        PoolExecutor::with_backend(ThreadBackend::new(runner), max_tasks)
    }
}
