mod common;

use std::io::Write;

use dagrun::config::{ExecutorKind, load_and_validate, parse_str, task_specs, validate_config};
use dagrun::errors::DagrunError;
use dagrun::task::{NodeAdapter, NodeGroupPurpose, Value};
use dagrun_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use tempfile::NamedTempFile;

fn load(contents: &str) -> Result<dagrun::config::ConfigFile, DagrunError> {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    load_and_validate(file.path())
}

#[test]
fn test_minimal_config_gets_defaults() {
    common::init_tracing();
    let cfg = load(
        r#"
[task.hello]
cmd = "echo hello"
"#,
    )
    .expect("valid config");

    assert_eq!(cfg.runner.idle_wait_ms, 10);
    assert_eq!(cfg.executors.local.kind, ExecutorKind::Synchronous);
    assert_eq!(cfg.executors.remote.kind, ExecutorKind::Processes);
    assert_eq!(cfg.executors.remote.effective_max_tasks(), 5);

    let task = &cfg.task["hello"];
    assert_eq!(task.purpose, NodeGroupPurpose::ExecuteSingle);
    assert_eq!(task.adapter, NodeAdapter::Direct);
    assert!(task.after.is_empty());
}

#[test]
fn test_full_config_round_trips_into_task_units() {
    common::init_tracing();
    let cfg = load(
        r#"
[runner]
idle_wait_ms = 25

[executors.local]
kind = "threads"
max_tasks = 2

[executors.remote]
kind = "processes"
max_tasks = 3

[inputs]
region = "eu"
limit = 10

[task.fetch]
cmd = "echo fetched"
purpose = "execute_block"
inputs = ["region"]

[task.report]
cmd = "echo report"
purpose = "gather"
after = ["fetch"]
adapter = "timed"
overrides = { limit = 3 }
"#,
    )
    .expect("valid config");

    assert_eq!(cfg.runner.idle_wait_ms, 25);
    assert_eq!(cfg.executors.local.kind, ExecutorKind::Threads);
    assert_eq!(cfg.executors.local.effective_max_tasks(), 2);

    let specs = task_specs(&cfg);
    assert_eq!(specs.len(), 2);

    let fetch = specs.iter().find(|s| s.template.task_id() == "fetch").unwrap();
    assert_eq!(fetch.template.purpose(), NodeGroupPurpose::ExecuteBlock);
    assert_eq!(
        fetch.template.dynamic_inputs().get("region"),
        Some(&Value::from("eu"))
    );
    assert!(
        fetch.template.dynamic_inputs().get("limit").is_none(),
        "only listed inputs are passed"
    );

    let report = specs.iter().find(|s| s.template.task_id() == "report").unwrap();
    assert_eq!(report.after, vec!["fetch".to_string()]);
    assert_eq!(report.template.adapters(), &[NodeAdapter::Timed]);
    assert_eq!(
        report.template.overrides().get("limit"),
        Some(&Value::from(3))
    );
    assert_eq!(report.template.nodes()[0].dependencies, vec!["fetch"]);
}

#[test]
fn test_dag_cycle_returns_structured_error() {
    let result = load(
        r#"
[task.A]
cmd = "echo A"
after = ["B"]

[task.B]
cmd = "echo B"
after = ["A"]
"#,
    );

    match result {
        Err(DagrunError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains("A") || msg.contains("B"));
        }
        Err(e) => panic!("Expected DagCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_unknown_dependency_returns_config_error() {
    let result = load(
        r#"
[task.A]
cmd = "echo A"
after = ["NonExistent"]
"#,
    );

    match result {
        Err(DagrunError::ConfigError(msg)) => {
            assert!(msg.contains("unknown dependency"));
            assert!(msg.contains("NonExistent"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_synchronous_executor_cannot_set_max_tasks() {
    let result = load(
        r#"
[executors.local]
kind = "synchronous"
max_tasks = 4

[task.A]
cmd = "echo A"
"#,
    );

    match result {
        Err(DagrunError::ConfigError(msg)) => assert!(msg.contains("synchronous")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_zero_max_tasks_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_remote(ExecutorKind::Threads, Some(0))
        .with_task("A", TaskConfigBuilder::new("echo A").build())
        .build_raw();

    match validate_config(&raw) {
        Err(DagrunError::ConfigError(msg)) => assert!(msg.contains("max_tasks")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn test_undefined_input_is_rejected_unless_overridden() {
    let missing = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("echo A").input("region").build())
        .build_raw();
    match validate_config(&missing) {
        Err(DagrunError::ConfigError(msg)) => assert!(msg.contains("region")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }

    let overridden = ConfigFileBuilder::new()
        .with_task(
            "A",
            TaskConfigBuilder::new("echo A")
                .input("region")
                .override_value("region", Value::from("us"))
                .build(),
        )
        .build_raw();
    assert!(validate_config(&overridden).is_ok());

    let global = ConfigFileBuilder::new()
        .with_input("region", Value::from("eu"))
        .with_task("A", TaskConfigBuilder::new("echo A").input("region").build())
        .build_raw();
    assert!(validate_config(&global).is_ok());
}

#[test]
fn test_empty_config_and_empty_cmd_are_rejected() {
    assert!(matches!(
        validate_config(&ConfigFileBuilder::new().build_raw()),
        Err(DagrunError::ConfigError(_))
    ));

    let blank = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("   ").build())
        .build_raw();
    assert!(matches!(
        validate_config(&blank),
        Err(DagrunError::ConfigError(msg)) if msg.contains("empty")
    ));
}

#[test]
fn test_bad_toml_and_bad_purpose_surface_as_toml_errors() {
    assert!(matches!(
        parse_str("[task.A\ncmd = 1"),
        Err(DagrunError::TomlError(_))
    ));
    assert!(matches!(
        parse_str("[task.A]\ncmd = \"x\"\npurpose = \"sometimes\"\n"),
        Err(DagrunError::TomlError(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_and_validate(dir.path().join("nope.toml")),
        Err(DagrunError::IoError(_))
    ));
}
