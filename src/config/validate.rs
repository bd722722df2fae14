// src/config/validate.rs

use crate::config::model::{ConfigFile, ExecutorConfig, ExecutorKind, RawConfigFile};
use crate::dag::graph::ensure_acyclic;
use crate::errors::{DagrunError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Run every check on a raw config without consuming it.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_executor("local", &cfg.executors.local)?;
    validate_executor("remote", &cfg.executors.remote)?;
    validate_tasks(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagrunError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor(role: &str, executor: &ExecutorConfig) -> Result<()> {
    match (executor.kind, executor.max_tasks) {
        (ExecutorKind::Synchronous, Some(_)) => Err(DagrunError::ConfigError(format!(
            "[executors.{role}] is synchronous and cannot set max_tasks"
        ))),
        (_, Some(0)) => Err(DagrunError::ConfigError(format!(
            "[executors.{role}].max_tasks must be >= 1 (got 0)"
        ))),
        _ => Ok(()),
    }
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(DagrunError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                name
            )));
        }
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(DagrunError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(DagrunError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
        for input in task.inputs.iter() {
            if !cfg.inputs.contains_key(input) && !task.overrides.contains_key(input) {
                return Err(DagrunError::ConfigError(format!(
                    "task '{}' uses input '{}' which is not defined in [inputs]",
                    name, input
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    ensure_acyclic(
        cfg.task
            .iter()
            .map(|(name, task)| (name.as_str(), task.after.as_slice())),
    )
}
