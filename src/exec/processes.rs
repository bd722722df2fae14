// src/exec/processes.rs

//! Pool backend that runs each task in a separate worker process.
//!
//! The task unit is serialized to JSON on the worker's stdin and the
//! outputs come back as JSON on its stdout (see [`crate::worker`]). The
//! worker command is arbitrary, so a wrapper such as `ssh host dagrun worker`
//! turns this into a remote backend.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::exec::pool::{PoolBackend, PoolExecutor, TaskReply};
use crate::task::{TaskUnit, ValueMap};
use crate::worker::{WORKER_SUBCOMMAND, WorkerReply, WorkerRequest};

/// The program to launch for each task.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerProgram {
    /// Whatever binary is running right now.
    CurrentExe,
    Path(PathBuf),
}

/// Command line used to start a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: WorkerProgram,
    args: Vec<OsString>,
}

impl WorkerCommand {
    /// `<current executable> worker`.
    ///
    /// The binary must route the `worker` subcommand to
    /// [`crate::worker::serve_stdio`].
    pub fn current_exe() -> Self {
        Self {
            program: WorkerProgram::CurrentExe,
            args: vec![OsString::from(WORKER_SUBCOMMAND)],
        }
    }

    pub fn program(path: impl Into<PathBuf>) -> Self {
        Self {
            program: WorkerProgram::Path(path.into()),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn resolve_program(&self) -> Result<PathBuf> {
        match &self.program {
            WorkerProgram::CurrentExe => {
                std::env::current_exe().context("resolving current executable for worker")
            }
            WorkerProgram::Path(path) => Ok(path.clone()),
        }
    }
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self::current_exe()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessBackend {
    command: Arc<WorkerCommand>,
}

impl ProcessBackend {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command: Arc::new(command),
        }
    }
}

impl PoolBackend for ProcessBackend {
    fn kind(&self) -> &'static str {
        "processes"
    }

    fn create_pool(&self, max_tasks: usize) -> std::io::Result<Runtime> {
        Builder::new_multi_thread()
            .worker_threads(max_tasks)
            .thread_name("dagrun-process")
            .enable_all()
            .build()
    }

    fn spawn(&self, pool: &Runtime, unit: Arc<TaskUnit>, reply: TaskReply) -> JoinHandle<()> {
        let command = Arc::clone(&self.command);
        pool.spawn(async move {
            let result = run_in_worker(&command, &unit).await;
            reply.send(result);
        })
    }
}

/// Bounded executor backed by worker processes.
pub type ProcessPoolExecutor = PoolExecutor<ProcessBackend>;

impl PoolExecutor<ProcessBackend> {
    pub fn new(command: WorkerCommand, max_tasks: usize) -> Self {
        PoolExecutor::with_backend(ProcessBackend::new(command), max_tasks)
    }
}

/// Run one task in a fresh worker process and decode its reply.
async fn run_in_worker(command: &WorkerCommand, unit: &TaskUnit) -> Result<ValueMap> {
    let program = command.resolve_program()?;

    info!(
        task = %unit.task_id(),
        program = %program.display(),
        "starting worker process"
    );

    let mut cmd = Command::new(&program);
    cmd.args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning worker process for task '{}'", unit.task_id()))?;

    let request = serde_json::to_vec(&WorkerRequest::new(unit.clone()))
        .with_context(|| format!("encoding task '{}' for worker", unit.task_id()))?;

    let mut stdin = child.stdin.take().context("worker stdin was not captured")?;
    stdin
        .write_all(&request)
        .await
        .with_context(|| format!("writing task '{}' to worker stdin", unit.task_id()))?;
    // Closing stdin tells the worker the request is complete.
    drop(stdin);

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let task_id = unit.task_id().to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_id, "worker stderr: {}", line);
            }
        });
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for worker of task '{}'", unit.task_id()))?;

    let code = output.status.code().unwrap_or(-1);
    info!(
        task = %unit.task_id(),
        exit_code = code,
        success = output.status.success(),
        "worker process exited"
    );

    if !output.status.success() {
        bail!("worker for task '{}' exited with code {}", unit.task_id(), code);
    }

    let reply: WorkerReply = serde_json::from_slice(&output.stdout)
        .with_context(|| format!("decoding worker reply for task '{}'", unit.task_id()))?;

    reply.into_result()
}
