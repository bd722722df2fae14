// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::engine::{DEFAULT_IDLE_WAIT, DEFAULT_REMOTE_MAX_TASKS};
use crate::task::{NodeAdapter, NodeGroupPurpose, ValueMap};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [runner]
/// idle_wait_ms = 10
///
/// [executors.local]
/// kind = "synchronous"
///
/// [executors.remote]
/// kind = "processes"
/// max_tasks = 5
///
/// [inputs]
/// seed = 3
///
/// [task.fetch]
/// cmd = "echo 41"
/// purpose = "execute_single"
///
/// [task.bump]
/// cmd = "echo $((DAGRUN_FETCH + DAGRUN_SEED))"
/// purpose = "execute_block"
/// after = ["fetch"]
/// inputs = ["seed"]
/// ```
///
/// Everything except the tasks has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub executors: ExecutorsSection,

    /// Global input values, available to tasks that list them in `inputs`.
    #[serde(default)]
    pub inputs: ValueMap,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub runner: RunnerSection,
    pub executors: ExecutorsSection,
    pub inputs: ValueMap,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    /// Only `validate` should call this.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            runner: raw.runner,
            executors: raw.executors,
            inputs: raw.inputs,
            task: raw.task,
        }
    }
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    /// Upper bound on the idle wait between cycles, in milliseconds.
    /// `0` makes the runner busy-poll.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
}

fn default_idle_wait_ms() -> u64 {
    DEFAULT_IDLE_WAIT.as_millis() as u64
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            idle_wait_ms: default_idle_wait_ms(),
        }
    }
}

/// `[executors]` section: the two roles the default routing knows about.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorsSection {
    /// Runs `execute_single` tasks.
    #[serde(default = "default_local_executor")]
    pub local: ExecutorConfig,

    /// Runs every other task.
    #[serde(default = "default_remote_executor")]
    pub remote: ExecutorConfig,
}

fn default_local_executor() -> ExecutorConfig {
    ExecutorConfig {
        kind: ExecutorKind::Synchronous,
        max_tasks: None,
    }
}

fn default_remote_executor() -> ExecutorConfig {
    ExecutorConfig {
        kind: ExecutorKind::Processes,
        max_tasks: Some(DEFAULT_REMOTE_MAX_TASKS),
    }
}

impl Default for ExecutorsSection {
    fn default() -> Self {
        Self {
            local: default_local_executor(),
            remote: default_remote_executor(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Inline, on the runner's thread.
    Synchronous,
    /// Fixed-size pool of threads.
    Threads,
    /// Fixed-size pool of worker processes.
    Processes,
}

/// `[executors.<role>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    pub kind: ExecutorKind,

    /// Concurrency budget of a pooled executor. Not allowed for
    /// `synchronous`.
    #[serde(default)]
    pub max_tasks: Option<usize>,
}

impl ExecutorConfig {
    pub fn effective_max_tasks(&self) -> usize {
        self.max_tasks.unwrap_or(DEFAULT_REMOTE_MAX_TASKS)
    }
}

/// `[task.<name>]` section.
///
/// Each task is one node named after the task; its command sees the outputs
/// of the tasks in `after` and the global inputs listed in `inputs` as
/// `DAGRUN_<NAME>` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command; its stdout is the task's output.
    pub cmd: String,

    /// Routing tag. Defaults to `execute_single` (runs on the local executor).
    #[serde(default)]
    pub purpose: NodeGroupPurpose,

    /// Tasks that must succeed first.
    #[serde(default)]
    pub after: Vec<String>,

    /// Names of global `[inputs]` this task consumes.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Values that replace inputs or dependency outputs of the same name.
    #[serde(default)]
    pub overrides: ValueMap,

    #[serde(default)]
    pub adapter: NodeAdapter,
}
