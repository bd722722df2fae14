// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only lifecycle, routing and configuration problems surface as
//! [`DagrunError`]. Failures inside a task body are plain `anyhow::Error`s
//! and are folded into `TaskState::Failed` at the task handle boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("Executor '{0}' is already initialized")]
    AlreadyInitialized(String),

    #[error("Executor '{0}' is not initialized")]
    NotInitialized(String),

    #[error("Executor '{executor}' is at capacity (max_tasks = {max_tasks})")]
    AtCapacity { executor: String, max_tasks: usize },

    #[error("Task '{task}' is already in flight on executor '{executor}'")]
    DuplicateSubmission { task: String, executor: String },

    #[error("No executor configured for task '{task}' (purpose {purpose})")]
    NoExecutorForTask { task: String, purpose: String },

    #[error("Unknown executor id {0}")]
    UnknownExecutor(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DagrunError>;
