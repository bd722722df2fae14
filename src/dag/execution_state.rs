// src/dag/execution_state.rs

//! Reference graph state over a static task DAG.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::ExecutionState;
use crate::dag::graph::TaskGraph;
use crate::errors::Result;
use crate::task::{GraphState, TaskId, TaskState, TaskUnit, ValueMap};

/// A task plus the tasks it has to wait for.
///
/// `template` is the unit as it will be submitted, minus the outputs of its
/// dependencies; those are merged into its dynamic inputs at release time.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub template: TaskUnit,
    pub after: Vec<TaskId>,
}

impl TaskSpec {
    pub fn new(template: TaskUnit) -> Self {
        Self {
            template,
            after: Vec::new(),
        }
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.after.extend(deps.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug)]
struct TaskEntry {
    template: TaskUnit,
    state: TaskState,
    /// The unit handed out on first release; reused after a rejection.
    released: Option<Arc<TaskUnit>>,
    result: Option<ValueMap>,
}

/// Releases tasks in dependency order and derives the graph state from the
/// per-task states.
///
/// - Rejected tasks are offered again before anything new, oldest first.
/// - A task is ready once every dependency is `Successful`; ready tasks are
///   released in the order they were declared.
/// - When a task fails, every dependent that has not run yet is failed too,
///   since it can never become ready.
#[derive(Debug)]
pub struct DagExecutionState {
    graph: TaskGraph,
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, TaskEntry>,
    rejected: VecDeque<Arc<TaskUnit>>,
}

impl DagExecutionState {
    pub fn new(specs: Vec<TaskSpec>) -> Result<Self> {
        let graph = TaskGraph::new(
            specs
                .iter()
                .map(|spec| (spec.template.task_id(), spec.after.as_slice())),
        )?;

        let mut order = Vec::with_capacity(specs.len());
        let mut tasks = HashMap::with_capacity(specs.len());

        for spec in specs {
            let id = spec.template.task_id().to_string();
            order.push(id.clone());
            tasks.insert(
                id,
                TaskEntry {
                    template: spec.template,
                    state: TaskState::Pending,
                    released: None,
                    result: None,
                },
            );
        }

        Ok(Self {
            graph,
            order,
            tasks,
            rejected: VecDeque::new(),
        })
    }

    /// Task ids in declaration order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.tasks.get(task_id).map(|entry| entry.state)
    }

    /// Outputs of a task that finished successfully.
    pub fn result_of(&self, task_id: &str) -> Option<&ValueMap> {
        self.tasks.get(task_id).and_then(|entry| entry.result.as_ref())
    }

    fn deps_satisfied(&self, task_id: &str) -> bool {
        self.graph.dependencies_of(task_id).iter().all(|dep| {
            self.tasks
                .get(dep)
                .is_some_and(|entry| entry.state == TaskState::Successful)
        })
    }

    /// Build the unit that actually gets submitted: the template with the
    /// outputs of every dependency merged into its dynamic inputs.
    fn materialize(&self, task_id: &str) -> Option<TaskUnit> {
        let entry = self.tasks.get(task_id)?;
        let mut inputs = entry.template.dynamic_inputs().clone();

        for dep in self.graph.dependencies_of(task_id) {
            if let Some(outputs) = self.tasks.get(dep).and_then(|e| e.result.as_ref()) {
                inputs.extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        Some(entry.template.clone().with_dynamic_inputs(inputs))
    }

    /// Fail every not-yet-released transitive dependent of `failed_task`.
    fn fail_dependents(&mut self, failed_task: &str) {
        let mut stack: Vec<TaskId> = self.graph.dependents_of(failed_task).to_vec();
        let mut visited: HashSet<TaskId> = HashSet::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            if let Some(entry) = self.tasks.get_mut(&name) {
                if entry.state == TaskState::Pending && entry.released.is_none() {
                    entry.state = TaskState::Failed;
                    debug!(
                        task = %name,
                        upstream = %failed_task,
                        "marking dependent as failed due to upstream failure"
                    );
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
            }
        }
    }
}

impl ExecutionState for DagExecutionState {
    fn graph_state(&self) -> GraphState {
        let mut any_failed = false;
        for entry in self.tasks.values() {
            match entry.state {
                TaskState::Pending | TaskState::Running => return GraphState::Running,
                TaskState::Failed => any_failed = true,
                TaskState::Successful => {}
            }
        }

        if any_failed {
            GraphState::Failed
        } else {
            GraphState::Successful
        }
    }

    fn release_next_task(&mut self) -> Option<Arc<TaskUnit>> {
        if let Some(unit) = self.rejected.pop_front() {
            if let Some(entry) = self.tasks.get_mut(unit.task_id()) {
                entry.state = TaskState::Running;
            }
            debug!(task = %unit.task_id(), "re-releasing previously rejected task");
            return Some(unit);
        }

        let next = self.order.iter().find(|id| {
            self.tasks
                .get(id.as_str())
                .is_some_and(|entry| entry.state == TaskState::Pending && entry.released.is_none())
                && self.deps_satisfied(id)
        })?;
        let next = next.clone();

        let unit = Arc::new(self.materialize(&next)?);
        if let Some(entry) = self.tasks.get_mut(&next) {
            entry.state = TaskState::Running;
            entry.released = Some(Arc::clone(&unit));
        }

        info!(task = %next, purpose = %unit.purpose(), "releasing task");
        Some(unit)
    }

    fn reject_task(&mut self, task: Arc<TaskUnit>) {
        match self.tasks.get_mut(task.task_id()) {
            Some(entry) => {
                entry.state = TaskState::Pending;
                self.rejected.push_back(task);
            }
            None => warn!(task = %task.task_id(), "rejection for unknown task; ignoring"),
        }
    }

    fn update_task_state(&mut self, task_id: &str, state: TaskState, result: Option<ValueMap>) {
        let Some(entry) = self.tasks.get_mut(task_id) else {
            warn!(task = %task_id, "state update for unknown task; ignoring");
            return;
        };

        if entry.state.is_terminal() {
            debug!(task = %task_id, %state, "task already terminal; ignoring update");
            return;
        }

        entry.state = state;
        match state {
            TaskState::Successful => {
                entry.result = result;
                debug!(task = %task_id, "task completed successfully");
            }
            TaskState::Failed => {
                warn!(task = %task_id, "task failed; failing dependents");
                self.fail_dependents(task_id);
            }
            TaskState::Pending | TaskState::Running => {}
        }
    }
}
