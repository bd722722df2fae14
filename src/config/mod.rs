// src/config/mod.rs

//! Configuration loading and validation for dagrun.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it (`validate.rs`).
//! - Turn a validated config into an execution state, a subdag runner and
//!   an execution manager (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::{execution_manager, execution_state, runner_options, shell_nodes, task_specs};
pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{
    ConfigFile, ExecutorConfig, ExecutorKind, ExecutorsSection, RawConfigFile, RunnerSection,
    TaskConfig,
};
pub use validate::validate_config;
