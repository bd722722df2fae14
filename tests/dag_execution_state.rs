mod common;

use std::sync::Arc;

use dagrun::dag::{DagExecutionState, ExecutionState, TaskSpec};
use dagrun::errors::DagrunError;
use dagrun::task::{GraphState, Node, NodeGroupPurpose, TaskState, TaskUnit, Value, ValueMap};
use dagrun_test_utils::builders::{single_node_unit, values};

fn spec(id: &str, after: &[&str]) -> TaskSpec {
    TaskSpec::new(single_node_unit(id, NodeGroupPurpose::ExecuteBlock)).after(after.iter().copied())
}

fn release_id(state: &mut DagExecutionState) -> Option<String> {
    state
        .release_next_task()
        .map(|unit| unit.task_id().to_string())
}

fn succeed(state: &mut DagExecutionState, id: &str, value: Value) {
    state.update_task_state(id, TaskState::Successful, Some(values([(id, value)])));
}

#[test]
fn releases_only_tasks_whose_dependencies_succeeded() {
    common::init_tracing();
    // a -> b -> d, a -> c -> d
    let mut state = DagExecutionState::new(vec![
        spec("a", &[]),
        spec("b", &["a"]),
        spec("c", &["a"]),
        spec("d", &["b", "c"]),
    ])
    .unwrap();

    assert_eq!(state.graph_state(), GraphState::Running);
    assert_eq!(release_id(&mut state).as_deref(), Some("a"));
    assert_eq!(release_id(&mut state), None);
    assert_eq!(state.task_state("a"), Some(TaskState::Running));

    succeed(&mut state, "a", Value::from(1));
    assert_eq!(release_id(&mut state).as_deref(), Some("b"));
    assert_eq!(release_id(&mut state).as_deref(), Some("c"));
    assert_eq!(release_id(&mut state), None);

    succeed(&mut state, "b", Value::from(2));
    assert_eq!(release_id(&mut state), None, "d still waits on c");

    succeed(&mut state, "c", Value::from(3));
    assert_eq!(release_id(&mut state).as_deref(), Some("d"));
    succeed(&mut state, "d", Value::from(4));

    assert_eq!(release_id(&mut state), None);
    assert_eq!(state.graph_state(), GraphState::Successful);
    assert_eq!(
        state.task_ids().collect::<Vec<_>>(),
        vec!["a", "b", "c", "d"]
    );
}

#[test]
fn rejected_task_comes_back_first_and_unchanged() {
    common::init_tracing();
    let mut state = DagExecutionState::new(vec![spec("a", &[]), spec("b", &[])]).unwrap();

    let a = state.release_next_task().unwrap();
    let before = (*a).clone();
    state.reject_task(Arc::clone(&a));
    assert_eq!(state.task_state("a"), Some(TaskState::Pending));
    assert_eq!(state.graph_state(), GraphState::Running);

    let again = state.release_next_task().unwrap();
    assert!(Arc::ptr_eq(&a, &again));
    assert_eq!(*again, before);
    assert_eq!(state.task_state("a"), Some(TaskState::Running));

    // Rejecting over and over never duplicates the task.
    for _ in 0..5 {
        state.reject_task(Arc::clone(&again));
        let unit = state.release_next_task().unwrap();
        assert_eq!(unit.task_id(), "a");
    }

    assert_eq!(release_id(&mut state).as_deref(), Some("b"));
    assert_eq!(release_id(&mut state), None);
}

#[test]
fn failure_fails_every_pending_dependent() {
    common::init_tracing();
    let mut state = DagExecutionState::new(vec![
        spec("root", &[]),
        spec("mid", &["root"]),
        spec("leaf", &["mid"]),
        spec("other", &[]),
    ])
    .unwrap();

    assert_eq!(release_id(&mut state).as_deref(), Some("root"));
    assert_eq!(release_id(&mut state).as_deref(), Some("other"));

    state.update_task_state("root", TaskState::Failed, None);
    assert_eq!(state.task_state("mid"), Some(TaskState::Failed));
    assert_eq!(state.task_state("leaf"), Some(TaskState::Failed));
    assert_eq!(state.graph_state(), GraphState::Running, "other still runs");

    succeed(&mut state, "other", Value::Null);
    assert_eq!(release_id(&mut state), None);
    assert_eq!(state.graph_state(), GraphState::Failed);
}

#[test]
fn terminal_states_are_final() {
    common::init_tracing();
    let mut state = DagExecutionState::new(vec![spec("a", &[])]).unwrap();
    release_id(&mut state);

    succeed(&mut state, "a", Value::from("first"));
    state.update_task_state("a", TaskState::Failed, None);
    state.update_task_state("a", TaskState::Running, None);

    assert_eq!(state.task_state("a"), Some(TaskState::Successful));
    assert_eq!(
        state.result_of("a").and_then(|r| r.get("a")),
        Some(&Value::from("first"))
    );

    // Updates for tasks the graph does not know are ignored.
    state.update_task_state("ghost", TaskState::Failed, None);
    assert_eq!(state.graph_state(), GraphState::Successful);
}

#[test]
fn dependency_outputs_are_merged_into_dynamic_inputs() {
    common::init_tracing();
    let template = TaskUnit::new(
        "sum",
        NodeGroupPurpose::Gather,
        vec![Node::new("sum").with_dependencies(["x", "y", "bias"])],
    )
    .with_dynamic_inputs(values([("bias", Value::from(100))]));

    let mut state = DagExecutionState::new(vec![
        spec("x", &[]),
        spec("y", &[]),
        TaskSpec::new(template).after(["x", "y"]),
    ])
    .unwrap();

    release_id(&mut state);
    release_id(&mut state);
    succeed(&mut state, "x", Value::from(1));
    succeed(&mut state, "y", Value::from(2));

    let unit = state.release_next_task().unwrap();
    assert_eq!(unit.task_id(), "sum");
    let expected: ValueMap = values([
        ("bias", Value::from(100)),
        ("x", Value::from(1)),
        ("y", Value::from(2)),
    ]);
    assert_eq!(unit.dynamic_inputs(), &expected);
}

#[test]
fn invalid_graphs_are_rejected() {
    common::init_tracing();

    let cycle = DagExecutionState::new(vec![spec("a", &["b"]), spec("b", &["a"])]);
    assert!(matches!(cycle, Err(DagrunError::DagCycle(_))));

    let unknown = DagExecutionState::new(vec![spec("a", &["missing"])]);
    match unknown {
        Err(DagrunError::ConfigError(msg)) => assert!(msg.contains("missing")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }

    let duplicate = DagExecutionState::new(vec![spec("a", &[]), spec("a", &[])]);
    assert!(matches!(duplicate, Err(DagrunError::ConfigError(_))));

    let own = DagExecutionState::new(vec![spec("a", &["a"])]);
    assert!(matches!(own, Err(DagrunError::ConfigError(_))));
}
