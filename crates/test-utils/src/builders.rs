#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use dagrun::config::{
    ConfigFile, ExecutorConfig, ExecutorKind, ExecutorsSection, RawConfigFile, RunnerSection,
    TaskConfig,
};
use dagrun::task::{Node, NodeAdapter, NodeGroupPurpose, TaskUnit, Value, ValueMap};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                runner: RunnerSection::default(),
                executors: ExecutorsSection::default(),
                inputs: ValueMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_input(mut self, name: &str, value: Value) -> Self {
        self.config.inputs.insert(name.to_string(), value);
        self
    }

    pub fn with_local(mut self, kind: ExecutorKind, max_tasks: Option<usize>) -> Self {
        self.config.executors.local = ExecutorConfig { kind, max_tasks };
        self
    }

    pub fn with_remote(mut self, kind: ExecutorKind, max_tasks: Option<usize>) -> Self {
        self.config.executors.remote = ExecutorConfig { kind, max_tasks };
        self
    }

    pub fn with_idle_wait_ms(mut self, ms: u64) -> Self {
        self.config.runner.idle_wait_ms = ms;
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                purpose: NodeGroupPurpose::ExecuteSingle,
                after: vec![],
                inputs: vec![],
                overrides: ValueMap::new(),
                adapter: NodeAdapter::Direct,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn input(mut self, name: &str) -> Self {
        self.task.inputs.push(name.to_string());
        self
    }

    pub fn purpose(mut self, purpose: NodeGroupPurpose) -> Self {
        self.task.purpose = purpose;
        self
    }

    pub fn override_value(mut self, name: &str, value: Value) -> Self {
        self.task.overrides.insert(name.to_string(), value);
        self
    }

    pub fn adapter(mut self, adapter: NodeAdapter) -> Self {
        self.task.adapter = adapter;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Single-node unit whose node is named after the task.
pub fn single_node_unit(id: &str, purpose: NodeGroupPurpose) -> TaskUnit {
    TaskUnit::new(id, purpose, vec![Node::new(id)])
}

/// Same as [`single_node_unit`], already shared.
pub fn shared_unit(id: &str, purpose: NodeGroupPurpose) -> Arc<TaskUnit> {
    Arc::new(single_node_unit(id, purpose))
}

/// Build a `ValueMap` from `(name, value)` pairs.
pub fn values<I, S>(pairs: I) -> ValueMap
where
    I: IntoIterator<Item = (S, Value)>,
    S: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
