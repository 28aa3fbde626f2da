use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::behavior::{ActivityBehavior, TaskHandler};
use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::parser::{ActivityDefinition, ProcessDefinition};

use super::agenda::{Agenda, Operation};
use super::history::{HistoryEventKind, HistoryLog};
use super::task::{NewTask, TaskId, TaskStore};
use super::tree::{ExecutionTree, ScopeView};
use super::ExecutionId;

/// Local variable holding the index of a multi-instance child.
pub const LOOP_COUNTER: &str = "loopCounter";

pub(crate) type HandlerRegistry = IndexMap<String, Arc<dyn TaskHandler>>;

/// Mutable runtime data shared by every process instance of an engine.
#[derive(Debug)]
pub(crate) struct RuntimeState {
    pub(crate) config: EngineConfig,
    pub(crate) tree: ExecutionTree,
    pub(crate) tasks: TaskStore,
    pub(crate) agenda: Agenda,
    pub(crate) history: HistoryLog,
    pub(crate) ended: IndexMap<ExecutionId, IndexMap<String, Value>>,
}

impl RuntimeState {
    pub(crate) fn new(config: EngineConfig) -> Self {
        let history = HistoryLog::new(config.history_enabled);
        Self {
            config,
            tree: ExecutionTree::default(),
            tasks: TaskStore::default(),
            agenda: Agenda::default(),
            history,
            ended: IndexMap::new(),
        }
    }
}

/// Handle given to behaviors while one agenda operation runs.
///
/// The context is bound to one execution and the activity it is positioned at.
/// Tree changes take effect immediately; follow-up work (`leave`, behavior
/// execution, leaving through the outgoing flow) is queued on the agenda.
pub struct ExecutionContext<'a> {
    state: &'a mut RuntimeState,
    definition: &'a ProcessDefinition,
    activity: &'a ActivityDefinition,
    handlers: &'a HandlerRegistry,
    execution: ExecutionId,
    process_instance: ExecutionId,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        state: &'a mut RuntimeState,
        definition: &'a ProcessDefinition,
        activity: &'a ActivityDefinition,
        handlers: &'a HandlerRegistry,
        execution: ExecutionId,
    ) -> Self {
        let process_instance = state
            .tree
            .get(execution)
            .map(|execution| execution.process_instance())
            .unwrap_or(execution);
        Self {
            state,
            definition,
            activity,
            handlers,
            execution,
            process_instance,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution
    }

    pub fn process_instance(&self) -> ExecutionId {
        self.process_instance
    }

    pub fn definition(&self) -> &'a ProcessDefinition {
        self.definition
    }

    pub fn activity(&self) -> &'a ActivityDefinition {
        self.activity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    /// Variables visible from the bound execution.
    pub fn scope(&self) -> ScopeView<'_> {
        self.state.tree.scope(self.execution)
    }

    pub fn scope_of(&self, execution: ExecutionId) -> ScopeView<'_> {
        self.state.tree.scope(execution)
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.state.tree.variable(self.execution, name)
    }

    pub fn variable_local_of(&self, execution: ExecutionId, name: &str) -> Option<Value> {
        self.state
            .tree
            .get(execution)
            .and_then(|execution| execution.variable_local(name).cloned())
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.state.tree.set_variable(self.execution, name, value);
    }

    pub fn set_variable_local(&mut self, name: &str, value: Value) {
        self.state.tree.set_variable_local(self.execution, name, value);
    }

    pub fn set_variable_local_on(&mut self, execution: ExecutionId, name: &str, value: Value) {
        self.state.tree.set_variable_local(execution, name, value);
    }

    pub fn parent_of(&self, execution: ExecutionId) -> Option<ExecutionId> {
        self.state.tree.get(execution).and_then(|execution| execution.parent())
    }

    /// `None` when the execution no longer exists.
    pub fn is_active(&self, execution: ExecutionId) -> Option<bool> {
        self.state.tree.get(execution).map(|execution| execution.is_active())
    }

    pub fn set_active(&mut self, execution: ExecutionId, active: bool) {
        self.state.tree.set_active(execution, active);
    }

    pub fn children(&self, parent: ExecutionId) -> Vec<ExecutionId> {
        self.state.tree.children(parent)
    }

    /// Create a child of `parent` positioned at the current activity.
    pub fn create_child(&mut self, parent: ExecutionId, is_concurrent: bool) -> Result<ExecutionId, ExecutionError> {
        self.state
            .tree
            .create_child(parent, self.activity.id(), false, is_concurrent)
            .ok_or(ExecutionError::ExecutionNotFound(parent))
    }

    /// Remove `execution` with its subtree and open tasks.
    ///
    /// When `canceled` is set a `ChildCanceled` event is recorded for the execution.
    pub fn remove_execution(&mut self, execution: ExecutionId, canceled: bool) {
        let process_instance = self.process_instance;
        for removed in self.state.tree.remove_subtree(execution) {
            let dropped_tasks = self.state.tasks.remove_for_execution(removed.id());
            if canceled && removed.id() == execution {
                debug!(
                    execution = %removed.id(),
                    activity_id = %removed.activity_id(),
                    dropped_tasks,
                    "canceled child execution"
                );
                self.state.history.record(
                    process_instance,
                    HistoryEventKind::ChildCanceled {
                        activity_id: removed.activity_id().to_string(),
                        execution: removed.id(),
                        loop_counter: loop_counter_of(removed.variable_local(LOOP_COUNTER)),
                    },
                );
            }
        }
    }

    /// Mark the bound execution as waiting for a trigger.
    pub fn wait(&mut self) {
        self.state.tree.set_waiting(self.execution, true);
    }

    /// Finish the bound execution's step.
    pub fn leave(&mut self) {
        self.state.agenda.push(Operation::Leave(self.execution));
    }

    /// Move `execution` past the current activity.
    pub fn take_outgoing(&mut self, execution: ExecutionId) {
        self.state.agenda.push(Operation::TakeOutgoing(execution));
    }

    pub fn execute_behavior(&mut self, execution: ExecutionId, behavior: Arc<dyn ActivityBehavior>) {
        self.state.agenda.push(Operation::ExecuteBehavior { execution, behavior });
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub(crate) fn create_task(&mut self, task: NewTask) -> TaskId {
        self.state
            .tasks
            .create(self.activity.id(), self.execution, self.process_instance, task)
    }

    pub fn record(&mut self, kind: HistoryEventKind) {
        self.state.history.record(self.process_instance, kind);
    }

    pub(crate) fn state(&mut self) -> &mut RuntimeState {
        &mut *self.state
    }
}

pub(crate) fn loop_counter_of(value: Option<&Value>) -> Option<usize> {
    value.and_then(Value::as_u64).and_then(|counter| usize::try_from(counter).ok())
}
