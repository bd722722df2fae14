#![allow(dead_code)]

//! Fakes for driving the graph runner without a real DAG or real node bodies.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use dagrun::dag::ExecutionState;
use dagrun::errors::{DagrunError, Result};
use dagrun::exec::{CompletedTask, ExecutorContext, TaskExecutor, TaskHandle};
use dagrun::sink::EventSink;
use dagrun::subdag::FunctionRegistry;
use dagrun::task::{GraphState, TaskId, TaskState, TaskUnit, Value, ValueMap};

/// Everything the graph runner told a [`ScriptedState`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    Released(TaskId),
    NothingReady,
    Rejected(TaskId),
    Updated {
        task: TaskId,
        state: TaskState,
        has_result: bool,
    },
}

/// Execution state that hands out a fixed list of units in order.
///
/// The graph only turns terminal after a pull came back empty and every
/// released unit has reported a terminal state. Rejected units go back to
/// the front of the queue.
#[derive(Debug, Default)]
pub struct ScriptedState {
    queue: VecDeque<Arc<TaskUnit>>,
    states: HashMap<TaskId, TaskState>,
    results: HashMap<TaskId, ValueMap>,
    events: Vec<StateEvent>,
    exhausted: bool,
}

impl ScriptedState {
    pub fn new<I>(units: I) -> Self
    where
        I: IntoIterator<Item = TaskUnit>,
    {
        let queue: VecDeque<Arc<TaskUnit>> = units.into_iter().map(Arc::new).collect();
        let states = queue
            .iter()
            .map(|unit| (unit.task_id().to_string(), TaskState::Pending))
            .collect();
        Self {
            queue,
            states,
            ..Self::default()
        }
    }

    pub fn events(&self) -> &[StateEvent] {
        &self.events
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.states.get(task).copied()
    }

    pub fn result_of(&self, task: &str) -> Option<&ValueMap> {
        self.results.get(task)
    }

    pub fn empty_pulls(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, StateEvent::NothingReady))
            .count()
    }

    pub fn rejections_of(&self, task: &str) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, StateEvent::Rejected(t) if t == task))
            .count()
    }

    /// Position of the first event matching `pred`.
    pub fn position<F>(&self, pred: F) -> Option<usize>
    where
        F: Fn(&StateEvent) -> bool,
    {
        self.events.iter().position(pred)
    }
}

impl ExecutionState for ScriptedState {
    fn graph_state(&self) -> GraphState {
        let all_done = self.states.values().all(|s| s.is_terminal());
        if !self.exhausted || !all_done {
            return GraphState::Running;
        }
        if self.states.values().any(|s| *s == TaskState::Failed) {
            GraphState::Failed
        } else {
            GraphState::Successful
        }
    }

    fn release_next_task(&mut self) -> Option<Arc<TaskUnit>> {
        match self.queue.pop_front() {
            Some(unit) => {
                self.events
                    .push(StateEvent::Released(unit.task_id().to_string()));
                self.states
                    .insert(unit.task_id().to_string(), TaskState::Running);
                Some(unit)
            }
            None => {
                self.events.push(StateEvent::NothingReady);
                self.exhausted = true;
                None
            }
        }
    }

    fn reject_task(&mut self, unit: Arc<TaskUnit>) {
        self.events
            .push(StateEvent::Rejected(unit.task_id().to_string()));
        self.states
            .insert(unit.task_id().to_string(), TaskState::Pending);
        self.queue.push_front(unit);
    }

    fn update_task_state(&mut self, task_id: &str, state: TaskState, result: Option<ValueMap>) {
        self.events.push(StateEvent::Updated {
            task: task_id.to_string(),
            state,
            has_result: result.is_some(),
        });
        self.states.insert(task_id.to_string(), state);
        if let Some(result) = result {
            self.results.insert(task_id.to_string(), result);
        }
    }
}

/// What a [`RecordingSink`] saw.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    TaskFailed { task: TaskId, message: String },
    TaskRejected { task: TaskId, executor: String },
    GraphFinished(GraphState),
}

/// Sink that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    pub fn failures(&self) -> Vec<(TaskId, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::TaskFailed { task, message } => Some((task, message)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().expect("sink mutex poisoned").push(event);
    }
}

impl EventSink for RecordingSink {
    fn task_failed(&self, task_id: &str, error: &anyhow::Error) {
        self.push(SinkEvent::TaskFailed {
            task: task_id.to_string(),
            message: format!("{error:#}"),
        });
    }

    fn task_rejected(&self, task_id: &str, executor: &str) {
        self.push(SinkEvent::TaskRejected {
            task: task_id.to_string(),
            executor: executor.to_string(),
        });
    }

    fn graph_finished(&self, state: GraphState) {
        self.push(SinkEvent::GraphFinished(state));
    }
}

/// Start/end times and thread of one node body run.
#[derive(Debug, Clone)]
pub struct BodyRun {
    pub node: String,
    pub thread: thread::ThreadId,
    pub started: Instant,
    pub finished: Instant,
}

/// Shared log of node body runs.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    runs: Arc<Mutex<Vec<BodyRun>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<BodyRun> {
        self.runs.lock().expect("run log mutex poisoned").clone()
    }

    pub fn run_of(&self, node: &str) -> Option<BodyRun> {
        self.runs().into_iter().find(|r| r.node == node)
    }

    fn record(&self, run: BodyRun) {
        self.runs.lock().expect("run log mutex poisoned").push(run);
    }
}

/// Register a body for `node` that sleeps for `delay`, logs itself to `log`
/// and returns `output`.
pub fn timed_body(
    registry: FunctionRegistry,
    node: &str,
    delay: Duration,
    output: Value,
    log: &RunLog,
) -> FunctionRegistry {
    let name = node.to_string();
    let log = log.clone();
    registry.register(node, move |_kwargs: &ValueMap| {
        let started = Instant::now();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        log.record(BodyRun {
            node: name.clone(),
            thread: thread::current().id(),
            started,
            finished: Instant::now(),
        });
        Ok(output.clone())
    })
}

/// Register a body for `node` that always fails with `message`.
pub fn failing_body(registry: FunctionRegistry, node: &str, message: &str) -> FunctionRegistry {
    let message = message.to_string();
    registry.register(node, move |_kwargs: &ValueMap| Err(anyhow!(message.clone())))
}

/// Handle of a task that never finishes.
#[derive(Debug)]
pub struct NeverFinishes {
    task_id: TaskId,
}

impl TaskHandle for NeverFinishes {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn state(&mut self) -> TaskState {
        TaskState::Running
    }

    fn result(&self) -> Option<&ValueMap> {
        None
    }
}

/// Executor that records lifecycle calls into a shared journal and completes
/// every task immediately with empty outputs (unless told to hold them).
#[derive(Debug)]
pub struct JournalExecutor {
    name: String,
    journal: Arc<Mutex<Vec<String>>>,
    fail_init: bool,
    hold_tasks: bool,
    initialized: bool,
    ctx: ExecutorContext,
}

impl JournalExecutor {
    pub fn new(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            journal: Arc::clone(journal),
            fail_init: false,
            hold_tasks: false,
            initialized: false,
            ctx: ExecutorContext::default(),
        }
    }

    /// Make `init` fail with a config error.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Hand out handles that stay `Running` forever.
    pub fn holding_tasks(mut self) -> Self {
        self.hold_tasks = true;
        self
    }

    fn note(&self, what: &str) {
        self.journal
            .lock()
            .expect("journal mutex poisoned")
            .push(format!("{}:{}", self.name, what));
    }
}

impl TaskExecutor for JournalExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, ctx: ExecutorContext) {
        self.ctx = ctx;
    }

    fn init(&mut self) -> Result<()> {
        self.note("init");
        if self.fail_init {
            return Err(DagrunError::ConfigError(format!(
                "{} refused to start",
                self.name
            )));
        }
        self.initialized = true;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.note("finalize");
        self.initialized = false;
        Ok(())
    }

    fn can_submit_task(&mut self) -> bool {
        true
    }

    fn submit_task(&mut self, unit: Arc<TaskUnit>) -> Result<Box<dyn TaskHandle>> {
        self.note(&format!("submit {}", unit.task_id()));
        if self.hold_tasks {
            return Ok(Box::new(NeverFinishes {
                task_id: unit.task_id().to_string(),
            }));
        }
        Ok(Box::new(CompletedTask::new(
            unit.task_id().to_string(),
            Ok(ValueMap::new()),
            &self.ctx.sink,
        )))
    }
}

/// Snapshot of a journal.
pub fn journal_entries(journal: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    journal.lock().expect("journal mutex poisoned").clone()
}
