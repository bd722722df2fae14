mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use dagrun::dag::{DagExecutionState, ExecutionState, TaskSpec};
use dagrun::engine::{ExecutionManager, ExecutorId, GraphRunner, RoutingPolicy, RunnerOptions};
use dagrun::errors::DagrunError;
use dagrun::exec::{SynchronousLocalExecutor, TaskExecutor, ThreadPoolExecutor, WorkerCommand};
use dagrun::subdag::FunctionRegistry;
use dagrun::task::{GraphState, Node, NodeGroupPurpose, TaskState, TaskUnit, Value, ValueMap};
use dagrun_test_utils::builders::single_node_unit;
use dagrun_test_utils::fakes::{
    JournalExecutor, RecordingSink, RunLog, ScriptedState, SinkEvent, StateEvent, failing_body,
    journal_entries, timed_body,
};
use dagrun_test_utils::with_deadline;

fn updated(task: &str, state: TaskState, has_result: bool) -> StateEvent {
    StateEvent::Updated {
        task: task.to_string(),
        state,
        has_result,
    }
}

fn local_and_threads(registry: FunctionRegistry, max_tasks: usize) -> ExecutionManager {
    let registry = Arc::new(registry);
    ExecutionManager::with_local_and_remote(
        Box::new(SynchronousLocalExecutor::new(registry.clone())),
        Box::new(ThreadPoolExecutor::new(registry, max_tasks).with_name("remote")),
    )
}

#[test]
fn single_node_tasks_run_inline_in_release_order() {
    common::init_tracing();
    let log = RunLog::new();
    let registry = ["a", "b", "c"].iter().fold(FunctionRegistry::new(), |r, name| {
        timed_body(r, name, Duration::ZERO, Value::from(*name), &log)
    });
    let sink = RecordingSink::new();

    let run_log = log.clone();
    let run_sink = sink.clone();
    let (state, driver_thread) = with_deadline(move || {
        let state = ScriptedState::new(
            ["a", "b", "c"].map(|id| single_node_unit(id, NodeGroupPurpose::ExecuteSingle)),
        );
        let worker = WorkerCommand::program(common::dagrun_bin()).arg("worker");
        let manager =
            ExecutionManager::default_for(Arc::new(registry), worker).with_sink(run_sink);
        let mut runner = GraphRunner::new(state, manager);
        runner.run_until_complete().expect("run");
        (runner.into_execution_state(), thread::current().id())
    });

    assert_eq!(
        state.events(),
        &[
            StateEvent::Released("a".into()),
            updated("a", TaskState::Successful, true),
            StateEvent::Released("b".into()),
            updated("b", TaskState::Successful, true),
            StateEvent::Released("c".into()),
            updated("c", TaskState::Successful, true),
            StateEvent::NothingReady,
        ]
    );
    assert_eq!(state.empty_pulls(), 1);
    assert_eq!(state.graph_state(), GraphState::Successful);

    for run in run_log.runs() {
        assert_eq!(run.thread, driver_thread, "node {} left the driver thread", run.node);
    }
    assert_eq!(
        state.result_of("b").and_then(|r| r.get("b")),
        Some(&Value::from("b"))
    );
    assert_eq!(
        sink.events().last(),
        Some(&SinkEvent::GraphFinished(GraphState::Successful))
    );
}

#[test]
fn full_pool_hands_task_back_until_capacity_frees() {
    common::init_tracing();
    let log = RunLog::new();
    let registry = timed_body(
        FunctionRegistry::new(),
        "u1",
        Duration::from_millis(200),
        Value::from(1),
        &log,
    );
    let registry = timed_body(registry, "u2", Duration::ZERO, Value::from(2), &log);
    let sink = RecordingSink::new();

    let run_sink = sink.clone();
    let state = with_deadline(move || {
        let state = ScriptedState::new(
            ["u1", "u2"].map(|id| single_node_unit(id, NodeGroupPurpose::ExecuteBlock)),
        );
        let manager = local_and_threads(registry, 1).with_sink(run_sink);
        let mut runner = GraphRunner::new(state, manager);
        runner.run_until_complete().expect("run");
        runner.into_execution_state()
    });

    assert!(state.rejections_of("u2") >= 1);
    assert!(sink.events().iter().any(|e| matches!(
        e,
        SinkEvent::TaskRejected { task, executor } if task == "u2" && executor == "remote"
    )));

    let u1 = log.run_of("u1").expect("u1 ran");
    let u2 = log.run_of("u2").expect("u2 ran");
    assert!(
        u2.started >= u1.finished,
        "u2 started while u1 still held the only slot"
    );

    assert_eq!(state.state_of("u1"), Some(TaskState::Successful));
    assert_eq!(state.state_of("u2"), Some(TaskState::Successful));
    assert_eq!(state.graph_state(), GraphState::Successful);
}

#[test]
fn failing_task_is_failed_logged_and_has_no_result() {
    common::init_tracing();

    for purpose in [NodeGroupPurpose::ExecuteSingle, NodeGroupPurpose::ExecuteBlock] {
        let registry = failing_body(FunctionRegistry::new(), "bad", "exit status 3");
        let sink = RecordingSink::new();

        let run_sink = sink.clone();
        let state = with_deadline(move || {
            let state = ScriptedState::new([single_node_unit("bad", purpose)]);
            let manager = local_and_threads(registry, 2).with_sink(run_sink);
            let mut runner = GraphRunner::new(state, manager);
            runner.run_until_complete().expect("task failures do not abort the run");
            runner.into_execution_state()
        });

        assert_eq!(state.state_of("bad"), Some(TaskState::Failed), "{purpose}");
        assert!(state.result_of("bad").is_none());
        assert!(
            state
                .events()
                .contains(&updated("bad", TaskState::Failed, false))
        );
        assert_eq!(state.graph_state(), GraphState::Failed);

        let failures = sink.failures();
        assert_eq!(failures.len(), 1, "{purpose}");
        assert!(failures[0].1.contains("exit status 3"));
        assert_eq!(
            sink.events().last(),
            Some(&SinkEvent::GraphFinished(GraphState::Failed))
        );
    }
}

#[derive(Debug)]
struct NothingRoutes;

impl RoutingPolicy for NothingRoutes {
    fn route(&self, _task: &TaskUnit) -> Option<ExecutorId> {
        None
    }
}

#[test]
fn routing_failure_aborts_run_but_still_finalizes() {
    common::init_tracing();
    let journal = Arc::new(Mutex::new(Vec::new()));

    let state = ScriptedState::new([single_node_unit("t", NodeGroupPurpose::ExecuteSingle)]);
    let executors: Vec<Box<dyn TaskExecutor>> =
        vec![Box::new(JournalExecutor::new("only", &journal))];
    let manager = ExecutionManager::new(executors, NothingRoutes);
    let mut runner = GraphRunner::new(state, manager);

    let err = runner.run_until_complete().unwrap_err();
    assert!(matches!(err, DagrunError::NoExecutorForTask { .. }));
    assert_eq!(journal_entries(&journal), vec!["only:init", "only:finalize"]);
}

#[test]
fn init_failure_aborts_before_any_release() {
    common::init_tracing();
    let journal = Arc::new(Mutex::new(Vec::new()));

    let state = ScriptedState::new([single_node_unit("t", NodeGroupPurpose::ExecuteSingle)]);
    let manager = ExecutionManager::with_local_and_remote(
        Box::new(JournalExecutor::new("local", &journal)),
        Box::new(JournalExecutor::new("remote", &journal).failing_init()),
    );
    let mut runner = GraphRunner::new(state, manager);

    assert!(runner.run_until_complete().is_err());
    assert!(runner.execution_state().events().is_empty());
    assert_eq!(
        journal_entries(&journal),
        vec!["local:init", "remote:init"]
    );
}

#[test]
fn panicking_inline_body_fails_its_task_and_run_finalizes() {
    common::init_tracing();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new()
        .register("boom", |_kwargs: &ValueMap| -> anyhow::Result<Value> { panic!("body panicked") });
    let sink = RecordingSink::new();

    let state = ScriptedState::new([single_node_unit("boom", NodeGroupPurpose::ExecuteSingle)]);
    let manager = ExecutionManager::with_local_and_remote(
        Box::new(SynchronousLocalExecutor::new(Arc::new(registry))),
        Box::new(JournalExecutor::new("remote", &journal)),
    )
    .with_sink(sink.clone());
    let mut runner = GraphRunner::new(state, manager);

    runner
        .run_until_complete()
        .expect("a panicking body is a task failure");

    let state = runner.into_execution_state();
    assert_eq!(state.state_of("boom"), Some(TaskState::Failed));
    assert!(state.result_of("boom").is_none());
    assert_eq!(state.graph_state(), GraphState::Failed);

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.contains("body panicked"), "{}", failures[0].1);
    assert_eq!(
        journal_entries(&journal),
        vec!["remote:init", "remote:finalize"]
    );
}

#[derive(Debug)]
struct PanickingRoutes;

impl RoutingPolicy for PanickingRoutes {
    fn route(&self, _task: &TaskUnit) -> Option<ExecutorId> {
        panic!("routing blew up");
    }
}

#[test]
fn panic_inside_the_loop_still_finalizes_then_propagates() {
    common::init_tracing();
    let journal = Arc::new(Mutex::new(Vec::new()));

    let state = ScriptedState::new([single_node_unit("t", NodeGroupPurpose::ExecuteSingle)]);
    let executors: Vec<Box<dyn TaskExecutor>> =
        vec![Box::new(JournalExecutor::new("only", &journal))];
    let mut runner = GraphRunner::new(state, ExecutionManager::new(executors, PanickingRoutes));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.run_until_complete()));

    assert!(outcome.is_err(), "panic must reach the caller");
    assert_eq!(journal_entries(&journal), vec!["only:init", "only:finalize"]);
}

#[test]
fn releasing_an_in_flight_task_again_aborts_the_run() {
    common::init_tracing();
    let journal = Arc::new(Mutex::new(Vec::new()));

    let state = ScriptedState::new([
        single_node_unit("twice", NodeGroupPurpose::ExecuteBlock),
        single_node_unit("twice", NodeGroupPurpose::ExecuteBlock),
    ]);
    let manager = ExecutionManager::with_local_and_remote(
        Box::new(JournalExecutor::new("local", &journal)),
        Box::new(JournalExecutor::new("remote", &journal).holding_tasks()),
    );
    let mut runner = GraphRunner::new(state, manager);

    let err = runner.run_until_complete().unwrap_err();
    assert!(
        matches!(&err, DagrunError::DuplicateSubmission { task, executor }
            if task == "twice" && executor == "remote"),
        "{err}"
    );
    assert_eq!(
        journal_entries(&journal),
        vec![
            "local:init",
            "remote:init",
            "remote:submit twice",
            "local:finalize",
            "remote:finalize",
        ]
    );
}

#[cfg(unix)]
#[test]
fn default_manager_sends_blocks_to_configured_workers() {
    common::init_tracing();
    let (_dir, config) = common::write_config(
        r#"
[task.seven]
cmd = "echo 7"
"#,
    );
    let log = RunLog::new();
    let registry = timed_body(FunctionRegistry::new(), "one", Duration::ZERO, Value::from(1), &log);

    let state = with_deadline(move || {
        let worker = WorkerCommand::program(common::dagrun_bin())
            .arg("worker")
            .arg("--config")
            .arg(&config);
        let state = ScriptedState::new([
            single_node_unit("one", NodeGroupPurpose::ExecuteSingle),
            single_node_unit("seven", NodeGroupPurpose::ExecuteBlock),
        ]);
        let manager = ExecutionManager::default_for(Arc::new(registry), worker);
        let mut runner = GraphRunner::new(state, manager);
        runner.run_until_complete().expect("run");
        runner.into_execution_state()
    });

    assert_eq!(state.state_of("one"), Some(TaskState::Successful));
    assert_eq!(state.state_of("seven"), Some(TaskState::Successful));
    assert_eq!(
        state.result_of("seven").and_then(|r| r.get("seven")),
        Some(&Value::from(7))
    );
    assert_eq!(log.runs().len(), 1, "only the single-node task runs in-process");
}

fn number(kwargs: &ValueMap, key: &str) -> anyhow::Result<i64> {
    kwargs
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("missing numeric input '{key}'"))
}

#[test]
fn dag_outputs_flow_downstream_across_executors() {
    common::init_tracing();

    let registry = FunctionRegistry::new()
        .register("a", |_kwargs: &ValueMap| Ok(Value::from(2)))
        .register("b", |kwargs: &ValueMap| {
            Ok(Value::from(number(kwargs, "a")? * number(kwargs, "scale")?))
        })
        .register("c", |kwargs: &ValueMap| Ok(Value::from(number(kwargs, "b")? + 1)));

    let state = with_deadline(move || {
        let specs = vec![
            TaskSpec::new(single_node_unit("a", NodeGroupPurpose::ExecuteSingle)),
            TaskSpec::new(
                TaskUnit::new(
                    "b",
                    NodeGroupPurpose::ExecuteBlock,
                    vec![Node::new("b").with_dependencies(["a", "scale"])],
                )
                .with_dynamic_inputs(ValueMap::from([("scale".to_string(), Value::from(10))])),
            )
            .after(["a"]),
            TaskSpec::new(TaskUnit::new(
                "c",
                NodeGroupPurpose::Gather,
                vec![Node::new("c").with_dependencies(["b"])],
            ))
            .after(["b"]),
        ];
        let state = DagExecutionState::new(specs).expect("valid dag");
        let manager = local_and_threads(registry, 2);
        let mut runner = GraphRunner::new(state, manager).with_options(RunnerOptions {
            idle_wait: Duration::from_millis(5),
        });
        runner.run_until_complete().expect("run");
        runner.into_execution_state()
    });

    assert_eq!(state.graph_state(), GraphState::Successful);
    assert_eq!(
        state.result_of("b").and_then(|r| r.get("b")),
        Some(&Value::from(20))
    );
    assert_eq!(
        state.result_of("c").and_then(|r| r.get("c")),
        Some(&Value::from(21))
    );
}

#[test]
fn upstream_failure_fails_the_whole_chain() {
    common::init_tracing();

    let registry = failing_body(FunctionRegistry::new(), "a", "no data");
    let log = RunLog::new();
    let registry = timed_body(registry, "b", Duration::ZERO, Value::Null, &log);

    let state = with_deadline(move || {
        let specs = vec![
            TaskSpec::new(single_node_unit("a", NodeGroupPurpose::ExecuteBlock)),
            TaskSpec::new(single_node_unit("b", NodeGroupPurpose::ExecuteSingle)).after(["a"]),
        ];
        let state = DagExecutionState::new(specs).expect("valid dag");
        let mut runner = GraphRunner::new(state, local_and_threads(registry, 1));
        runner.run_until_complete().expect("run");
        runner.into_execution_state()
    });

    assert_eq!(state.graph_state(), GraphState::Failed);
    assert_eq!(state.task_state("a"), Some(TaskState::Failed));
    assert_eq!(state.task_state("b"), Some(TaskState::Failed));
    assert!(log.runs().is_empty(), "dependent of a failed task must not run");
}
