// src/exec/executor.rs

//! The executor contract shared by every backend.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::errors::Result;
use crate::exec::handle::TaskHandle;
use crate::sink::{SharedSink, default_sink};
use crate::task::TaskUnit;

/// Accepts task units and runs them on some concurrency substrate.
///
/// Lifecycle: `init` once, then any number of admission checks and
/// submissions, then `finalize` once. Calling `init` twice, or `finalize`
/// without a live `init`, is an error.
pub trait TaskExecutor: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Install the sink and wakeup channel. Called by the execution manager
    /// before `init`.
    fn attach(&mut self, ctx: ExecutorContext);

    /// Acquire backend resources.
    fn init(&mut self) -> Result<()>;

    /// Release backend resources.
    fn finalize(&mut self) -> Result<()>;

    /// Non-blocking admission check.
    fn can_submit_task(&mut self) -> bool;

    /// Hand `unit` to the backend and return a handle immediately.
    ///
    /// Only valid right after `can_submit_task` returned `true`; otherwise
    /// this returns an error instead of queueing without bound.
    fn submit_task(&mut self, unit: Arc<TaskUnit>) -> Result<Box<dyn TaskHandle>>;
}

/// Wakes the graph runner when a pooled task finishes.
///
/// Backed by a channel of capacity one: extra notifications coalesce, and a
/// missing receiver is not an error.
#[derive(Debug, Clone)]
pub struct Wakeup {
    tx: Sender<()>,
}

impl Wakeup {
    pub fn new(tx: Sender<()>) -> Self {
        Self { tx }
    }

    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Per-executor wiring installed by the execution manager.
#[derive(Debug, Clone)]
pub struct ExecutorContext {
    pub sink: SharedSink,
    pub wakeup: Option<Wakeup>,
}

impl ExecutorContext {
    pub fn new(sink: SharedSink, wakeup: Option<Wakeup>) -> Self {
        Self { sink, wakeup }
    }

    pub fn notify(&self) {
        if let Some(wakeup) = &self.wakeup {
            wakeup.notify();
        }
    }
}

impl Default for ExecutorContext {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            wakeup: None,
        }
    }
}
