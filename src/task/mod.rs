// src/task/mod.rs

//! Task data model shared by every layer.
//!
//! - [`unit`] holds the immutable [`TaskUnit`] handed out by the graph state
//!   and the payload types it carries.
//! - [`status`] holds the per-task and per-graph state enumerations.

pub mod status;
pub mod unit;

pub use status::{GraphState, TaskState};
pub use unit::{Node, NodeAdapter, NodeGroupPurpose, TaskId, TaskUnit, Value, ValueMap};
