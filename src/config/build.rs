// src/config/build.rs

//! Wiring from a validated [`ConfigFile`] to runnable components.

use std::sync::Arc;
use std::time::Duration;

use crate::config::model::{ConfigFile, ExecutorConfig, ExecutorKind};
use crate::dag::{DagExecutionState, TaskSpec};
use crate::engine::{ExecutionManager, RunnerOptions};
use crate::errors::Result;
use crate::exec::{
    ProcessPoolExecutor, SynchronousLocalExecutor, TaskExecutor, ThreadPoolExecutor,
    WorkerCommand,
};
use crate::subdag::{ShellNodes, SubdagRunner};
use crate::task::{Node, TaskUnit, ValueMap};

/// Node bodies for every configured task.
pub fn shell_nodes(cfg: &ConfigFile) -> ShellNodes {
    ShellNodes::new(
        cfg.task
            .iter()
            .map(|(name, task)| (name.clone(), task.cmd.clone()))
            .collect(),
    )
}

/// One single-node task unit per configured task.
///
/// The node depends on the upstream tasks and on the listed global inputs;
/// only those inputs are passed along.
pub fn task_specs(cfg: &ConfigFile) -> Vec<TaskSpec> {
    cfg.task
        .iter()
        .map(|(name, task)| {
            let inputs: ValueMap = task
                .inputs
                .iter()
                .filter_map(|key| cfg.inputs.get(key).map(|v| (key.clone(), v.clone())))
                .collect();

            let node = Node::new(name.clone())
                .with_dependencies(task.after.iter().chain(task.inputs.iter()).cloned());

            let unit = TaskUnit::new(name.clone(), task.purpose, vec![node])
                .with_dynamic_inputs(inputs)
                .with_overrides(task.overrides.clone())
                .with_adapters(vec![task.adapter]);

            TaskSpec::new(unit).after(task.after.iter().cloned())
        })
        .collect()
}

pub fn execution_state(cfg: &ConfigFile) -> Result<DagExecutionState> {
    DagExecutionState::new(task_specs(cfg))
}

/// Local and remote executors as configured, routed by purpose.
///
/// `worker` is only used by process executors.
pub fn execution_manager(
    cfg: &ConfigFile,
    runner: Arc<dyn SubdagRunner>,
    worker: &WorkerCommand,
) -> ExecutionManager {
    let local = build_executor("local", &cfg.executors.local, Arc::clone(&runner), worker);
    let remote = build_executor("remote", &cfg.executors.remote, runner, worker);
    ExecutionManager::with_local_and_remote(local, remote)
}

fn build_executor(
    role: &str,
    executor: &ExecutorConfig,
    runner: Arc<dyn SubdagRunner>,
    worker: &WorkerCommand,
) -> Box<dyn TaskExecutor> {
    match executor.kind {
        ExecutorKind::Synchronous => Box::new(SynchronousLocalExecutor::new(runner).with_name(role)),
        ExecutorKind::Threads => Box::new(
            ThreadPoolExecutor::new(runner, executor.effective_max_tasks()).with_name(role),
        ),
        ExecutorKind::Processes => Box::new(
            ProcessPoolExecutor::new(worker.clone(), executor.effective_max_tasks())
                .with_name(role),
        ),
    }
}

pub fn runner_options(cfg: &ConfigFile) -> RunnerOptions {
    RunnerOptions {
        idle_wait: Duration::from_millis(cfg.runner.idle_wait_ms),
    }
}
