// src/exec/handle.rs

//! Pollable handles over submitted tasks.

use anyhow::anyhow;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::sink::SharedSink;
use crate::task::{TaskId, TaskState, ValueMap};

/// Non-blocking view of one submitted task.
///
/// `state` never waits: it returns the best information available right
/// now. `result` reflects the most recent `state` call and is only `Some`
/// when that call returned `Successful`. Once a terminal state has been
/// observed it never changes.
pub trait TaskHandle: Send {
    fn task_id(&self) -> &str;

    fn state(&mut self) -> TaskState;

    fn result(&self) -> Option<&ValueMap>;
}

#[derive(Debug)]
enum Outcome {
    Succeeded(ValueMap),
    Failed,
}

impl Outcome {
    fn state(&self) -> TaskState {
        match self {
            Outcome::Succeeded(_) => TaskState::Successful,
            Outcome::Failed => TaskState::Failed,
        }
    }

    fn result(&self) -> Option<&ValueMap> {
        match self {
            Outcome::Succeeded(outputs) => Some(outputs),
            Outcome::Failed => None,
        }
    }
}

/// Handle for a task that already ran to completion before submission
/// returned.
#[derive(Debug)]
pub struct CompletedTask {
    task_id: TaskId,
    outcome: Outcome,
}

impl CompletedTask {
    /// Record the outcome; a failure is reported to `sink` here, once.
    pub fn new(task_id: TaskId, result: anyhow::Result<ValueMap>, sink: &SharedSink) -> Self {
        let outcome = match result {
            Ok(outputs) => Outcome::Succeeded(outputs),
            Err(err) => {
                sink.task_failed(&task_id, &err);
                Outcome::Failed
            }
        };
        Self { task_id, outcome }
    }
}

impl TaskHandle for CompletedTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn state(&mut self) -> TaskState {
        self.outcome.state()
    }

    fn result(&self) -> Option<&ValueMap> {
        self.outcome.result()
    }
}

/// Handle for a task running on a pool worker, which reports back over a
/// oneshot channel.
#[derive(Debug)]
pub struct ChannelTask {
    task_id: TaskId,
    rx: oneshot::Receiver<anyhow::Result<ValueMap>>,
    outcome: Option<Outcome>,
    sink: SharedSink,
}

impl ChannelTask {
    pub fn new(
        task_id: TaskId,
        rx: oneshot::Receiver<anyhow::Result<ValueMap>>,
        sink: SharedSink,
    ) -> Self {
        Self {
            task_id,
            rx,
            outcome: None,
            sink,
        }
    }

    fn fail(&mut self, err: anyhow::Error) -> TaskState {
        self.sink.task_failed(&self.task_id, &err);
        self.outcome = Some(Outcome::Failed);
        TaskState::Failed
    }
}

impl TaskHandle for ChannelTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn state(&mut self) -> TaskState {
        if let Some(outcome) = &self.outcome {
            return outcome.state();
        }

        match self.rx.try_recv() {
            Ok(Ok(outputs)) => {
                self.outcome = Some(Outcome::Succeeded(outputs));
                TaskState::Successful
            }
            Ok(Err(err)) => self.fail(err),
            Err(TryRecvError::Empty) => TaskState::Running,
            Err(TryRecvError::Closed) => self.fail(anyhow!(
                "worker for task '{}' went away without reporting a result",
                self.task_id
            )),
        }
    }

    fn result(&self) -> Option<&ValueMap> {
        self.outcome.as_ref().and_then(Outcome::result)
    }
}
