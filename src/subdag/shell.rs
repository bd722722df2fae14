// src/subdag/shell.rs

//! Node bodies backed by shell commands.

use std::collections::BTreeMap;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info};

use crate::subdag::{NodeBodies, SubdagRunner, execute_nodes};
use crate::task::{Node, NodeAdapter, Value, ValueMap};

/// Prefix for the environment variables that carry node dependencies.
pub const ENV_PREFIX: &str = "DAGRUN_";

/// Subdag runner whose node bodies are shell commands.
///
/// Each dependency value is exported as `DAGRUN_<NAME>` (strings verbatim,
/// everything else as JSON). The command's stdout becomes the node output:
/// parsed as JSON when possible, otherwise kept as a trimmed string.
#[derive(Debug, Clone, Default)]
pub struct ShellNodes {
    commands: BTreeMap<String, String>,
}

impl ShellNodes {
    pub fn new(commands: BTreeMap<String, String>) -> Self {
        Self { commands }
    }

    pub fn with_command(mut self, node: impl Into<String>, cmd: impl Into<String>) -> Self {
        self.commands.insert(node.into(), cmd.into());
        self
    }

    pub fn command_for(&self, node: &str) -> Option<&str> {
        self.commands.get(node).map(String::as_str)
    }
}

impl NodeBodies for ShellNodes {
    fn call(&self, node: &Node, kwargs: &ValueMap) -> Result<Value> {
        let cmd_line = self
            .command_for(&node.name)
            .ok_or_else(|| anyhow!("no command configured for node '{}'", node.name))?;

        info!(node = %node.name, cmd = %cmd_line, "running node command");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(cmd_line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(cmd_line);
            c
        };

        for (name, value) in kwargs {
            cmd.env(env_var_name(name), env_var_value(value));
        }

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("spawning process for node '{}'", node.name))?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(node = %node.name, "stderr: {}", line);
        }

        if !output.status.success() {
            bail!(
                "command for node '{}' exited with code {}",
                node.name,
                output.status.code().unwrap_or(-1)
            );
        }

        Ok(parse_stdout(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl SubdagRunner for ShellNodes {
    fn execute(
        &self,
        nodes: &[Node],
        inputs: &ValueMap,
        adapter: NodeAdapter,
        overrides: &ValueMap,
    ) -> Result<ValueMap> {
        execute_nodes(self, nodes, inputs, adapter, overrides)
    }
}

/// `fetch-data` -> `DAGRUN_FETCH_DATA`.
pub fn env_var_name(node: &str) -> String {
    let mut name = String::with_capacity(ENV_PREFIX.len() + node.len());
    name.push_str(ENV_PREFIX);
    for c in node.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
    }
    name
}

fn env_var_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_stdout(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
