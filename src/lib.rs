// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod sink;
pub mod subdag;
pub mod task;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::dag::{DagExecutionState, ExecutionState};
use crate::engine::GraphRunner;
use crate::exec::WorkerCommand;
use crate::task::GraphState;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the DAG execution state
/// - local / remote executors behind the execution manager
/// - the graph runner
///
/// Returns the final graph state. In worker mode it serves a single task
/// and reports `Successful` once the reply is written.
pub fn run(args: CliArgs) -> Result<GraphState> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let nodes = Arc::new(config::shell_nodes(&cfg));

    if let Some(Command::Worker) = args.command {
        worker::serve_stdio(nodes.as_ref())?;
        return Ok(GraphState::Successful);
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(GraphState::Successful);
    }

    let worker = worker_command(&args, &config_path);
    let state = config::execution_state(&cfg)?;
    let manager = config::execution_manager(&cfg, nodes, &worker);

    info!(tasks = cfg.task.len(), "starting graph run");

    let mut runner = GraphRunner::new(state, manager).with_options(config::runner_options(&cfg));
    runner.run_until_complete()?;

    let state = runner.into_execution_state();
    print_summary(&state);
    Ok(state.graph_state())
}

/// The current executable in worker mode, pointed at the same config.
fn worker_command(args: &CliArgs, config_path: &std::path::Path) -> WorkerCommand {
    let config_path = std::fs::canonicalize(config_path).unwrap_or_else(|_| config_path.to_path_buf());
    let mut command = WorkerCommand::current_exe()
        .arg("--config")
        .arg(config_path);
    if let Some(level) = args.log_level {
        command = command.arg("--log-level").arg(level.as_str());
    }
    command
}

fn print_summary(state: &DagExecutionState) {
    println!("dagrun: graph {}", state.graph_state());
    for task_id in state.task_ids() {
        let task_state = state
            .task_state(task_id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match state.result_of(task_id).and_then(|outputs| outputs.get(task_id)) {
            Some(value) => println!("  {task_id}: {task_state} = {value}"),
            None => println!("  {task_id}: {task_state}"),
        }
    }
}

/// Simple dry-run output: print tasks, deps, routing tags and commands.
fn print_dry_run(cfg: &ConfigFile) {
    println!("dagrun dry-run");
    println!(
        "  executors.local = {:?}, executors.remote = {:?} (max_tasks = {})",
        cfg.executors.local.kind,
        cfg.executors.remote.kind,
        cfg.executors.remote.effective_max_tasks()
    );
    println!("  runner.idle_wait_ms = {}", cfg.runner.idle_wait_ms);
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        println!("      purpose: {}", task.purpose);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if !task.inputs.is_empty() {
            println!("      inputs: {:?}", task.inputs);
        }
        if !task.overrides.is_empty() {
            println!("      overrides: {:?}", task.overrides.keys().collect::<Vec<_>>());
        }
    }

    debug!("dry-run complete (no execution)");
}
