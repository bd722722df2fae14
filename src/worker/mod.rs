// src/worker/mod.rs

//! Worker side of the process pool.
//!
//! A worker process reads exactly one [`WorkerRequest`] as JSON from stdin,
//! runs it, and writes exactly one [`WorkerReply`] as JSON to stdout. Task
//! failures travel inside the reply; a non-zero exit status means the worker
//! itself broke (bad request, I/O error).

use std::io::{Read, Write};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::exec::execute_task;
use crate::subdag::SubdagRunner;
use crate::task::{TaskUnit, ValueMap};

/// Subcommand the default worker command passes to the current executable.
pub const WORKER_SUBCOMMAND: &str = "worker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub unit: TaskUnit,
}

impl WorkerRequest {
    pub fn new(unit: TaskUnit) -> Self {
        Self { unit }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerReply {
    Succeeded { outputs: ValueMap },
    Failed { message: String },
}

impl WorkerReply {
    pub fn from_result(result: anyhow::Result<ValueMap>) -> Self {
        match result {
            Ok(outputs) => WorkerReply::Succeeded { outputs },
            Err(err) => WorkerReply::Failed {
                message: format!("{err:#}"),
            },
        }
    }

    pub fn into_result(self) -> anyhow::Result<ValueMap> {
        match self {
            WorkerReply::Succeeded { outputs } => Ok(outputs),
            WorkerReply::Failed { message } => Err(anyhow!(message)),
        }
    }
}

/// Serve one request from `input`, writing the reply to `output`.
pub fn serve<R, W>(runner: &dyn SubdagRunner, mut input: R, mut output: W) -> Result<()>
where
    R: Read,
    W: Write,
{
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let request: WorkerRequest = serde_json::from_slice(&raw)?;

    let task_id = request.unit.task_id().to_string();
    debug!(task = %task_id, "worker received task");

    let result = execute_task(runner, &request.unit);
    if let Err(err) = &result {
        warn!(task = %task_id, error = %format!("{err:#}"), "task failed in worker");
    }

    serde_json::to_writer(&mut output, &WorkerReply::from_result(result))?;
    output.flush()?;
    Ok(())
}

/// Serve one request over this process's stdin/stdout.
pub fn serve_stdio(runner: &dyn SubdagRunner) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(runner, stdin.lock(), stdout.lock())
}
