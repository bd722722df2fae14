// src/exec/mod.rs

//! Task execution layer.
//!
//! Everything here satisfies one contract: an executor accepts a
//! [`TaskUnit`], hands back a pollable [`TaskHandle`], and tells the caller
//! whether it has room for more work.
//!
//! - [`handle`] defines `TaskHandle` plus the two handle flavours: already
//!   finished, and fed by a worker over a oneshot channel.
//! - [`executor`] defines the `TaskExecutor` trait and the context
//!   (observability sink, wakeup channel) the manager attaches to it.
//! - [`synchronous`] runs a task inline on the caller's thread.
//! - [`pool`] is the bounded-pool executor, generic over a [`PoolBackend`].
//! - [`threads`] and [`processes`] are the two pool backends: blocking
//!   threads in this process, or worker processes fed over stdio.

pub mod executor;
pub mod handle;
pub mod pool;
pub mod processes;
pub mod synchronous;
pub mod threads;

use anyhow::{Result, anyhow};

use crate::subdag::SubdagRunner;
use crate::task::{TaskUnit, ValueMap};

pub use executor::{ExecutorContext, TaskExecutor, Wakeup};
pub use handle::{ChannelTask, CompletedTask, TaskHandle};
pub use pool::{PoolBackend, PoolExecutor, TaskReply};
pub use processes::{ProcessBackend, ProcessPoolExecutor, WorkerCommand};
pub use synchronous::SynchronousLocalExecutor;
pub use threads::{ThreadBackend, ThreadPoolExecutor};

/// Run one task unit through `runner`.
///
/// The nodes run with the unit's dynamic inputs and the merged override set,
/// through the first adapter only.
pub fn execute_task(runner: &dyn SubdagRunner, unit: &TaskUnit) -> Result<ValueMap> {
    let adapter = unit
        .primary_adapter()
        .ok_or_else(|| anyhow!("task '{}' has no adapter", unit.task_id()))?;

    runner.execute(
        unit.nodes(),
        unit.dynamic_inputs(),
        adapter,
        &unit.merged_overrides(),
    )
}
