//! In-memory process engine.
//!
//! Public calls queue operations on an agenda and drain it before returning.
//! Everything runs on the caller's thread; wrap the engine in a `Mutex` to
//! share it. Operations referencing an execution that has since been removed
//! (for example a canceled multi-instance child) are dropped.
//!
//! A failing operation is discarded together with the operations and history
//! it produced; the rest of the agenda still runs and the first error is
//! returned. Ended instances keep their final variables and history in memory
//! until [`ProcessEngine::prune_ended`] is called.

mod agenda;
mod context;
mod history;
mod task;
mod tree;

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use manifold_types::ProcessModel;

use crate::behavior::TaskHandler;
use crate::config::EngineConfig;
use crate::error::{DeployError, ExecutionError, ParseError};
use crate::parser::{ParsedProcess, ProcessDefinition, ProcessParser};

use agenda::Operation;
use context::{HandlerRegistry, RuntimeState, loop_counter_of};

pub use context::{ExecutionContext, LOOP_COUNTER};
pub use history::{HistoryEvent, HistoryEventKind};
pub(crate) use task::NewTask;
pub use task::{Task, TaskId};
pub use tree::{Execution, ExecutionId, ScopeView};

pub struct ProcessEngine {
    parser: ProcessParser,
    definitions: IndexMap<String, Arc<ProcessDefinition>>,
    handlers: HandlerRegistry,
    state: RuntimeState,
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_parser(config, ProcessParser::default())
    }

    /// Build an engine whose definitions are parsed by a custom parser.
    pub fn with_parser(config: EngineConfig, parser: ProcessParser) -> Self {
        Self {
            parser,
            definitions: IndexMap::new(),
            handlers: IndexMap::new(),
            state: RuntimeState::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    /// Register the handler service tasks refer to by `name`.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: impl TaskHandler + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Parse a model without deploying it.
    pub fn validate(&self, model: &ProcessModel) -> Result<ParsedProcess, ParseError> {
        self.parser.parse(model)
    }

    /// Parse and deploy a model. Models with any recorded problem are rejected.
    pub fn deploy(&mut self, model: &ProcessModel) -> Result<String, DeployError> {
        let parsed = self.parser.parse(model)?;
        if !parsed.problems.is_empty() {
            warn!(process_id = %model.id, problems = parsed.problems.len(), "rejected process with problems");
            return Err(DeployError::InvalidModel {
                process_id: model.id.clone(),
                problems: parsed.problems,
            });
        }
        let definition_id = parsed.definition.id().to_string();
        info!(process_id = %definition_id, activities = parsed.definition.activities().count(), "deployed process");
        self.definitions.insert(definition_id.clone(), Arc::new(parsed.definition));
        Ok(definition_id)
    }

    pub fn definition(&self, definition_id: &str) -> Option<&ProcessDefinition> {
        self.definitions.get(definition_id).map(Arc::as_ref)
    }

    /// Start a process instance and run it until every path waits or ends.
    pub fn start_process_instance(
        &mut self,
        definition_id: &str,
        variables: IndexMap<String, Value>,
    ) -> Result<ExecutionId, ExecutionError> {
        let definition = self
            .definitions
            .get(definition_id)
            .ok_or_else(|| ExecutionError::DefinitionNotFound(definition_id.to_string()))?;
        let initial = definition.initial().ok_or_else(|| ExecutionError::ActivityNotFound {
            definition_id: definition_id.to_string(),
            activity_id: String::new(),
        })?;

        let process_instance = self.state.tree.create_process_instance(definition_id, initial, variables);
        info!(process_instance = %process_instance, definition_id = %definition_id, "process instance started");
        self.state.history.record(
            process_instance,
            HistoryEventKind::ProcessStarted {
                definition_id: definition_id.to_string(),
            },
        );
        self.state.agenda.push(Operation::ContinueFlow(process_instance));
        self.run_agenda()?;
        Ok(process_instance)
    }

    /// Open tasks in creation order.
    pub fn tasks(&self) -> Vec<Task> {
        self.state.tasks.iter().cloned().collect()
    }

    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.state.tasks.get(task_id)
    }

    /// Complete a user task, storing `variables` from the task's execution, and resume the process.
    ///
    /// When the completion fails the task stays open so it can be completed again.
    pub fn complete_task(&mut self, task_id: TaskId, variables: IndexMap<String, Value>) -> Result<(), ExecutionError> {
        let task = self.state.tasks.remove(task_id).ok_or(ExecutionError::TaskNotFound(task_id))?;
        debug!(task_id, activity_id = %task.activity_id, execution = %task.execution, "completing task");
        for (name, value) in variables {
            self.state.tree.set_variable(task.execution, &name, value);
        }
        if let Err(error) = self.resume(task.execution, None) {
            if self.wait_again(task.execution, &task.activity_id) {
                debug!(task_id, execution = %task.execution, "task reopened after failed completion");
                self.state.tasks.restore(task);
            }
            return Err(error);
        }
        Ok(())
    }

    /// Resume an execution waiting in a receive task.
    pub fn signal(&mut self, execution_id: ExecutionId, payload: Option<Value>) -> Result<(), ExecutionError> {
        let execution = self
            .state
            .tree
            .get(execution_id)
            .ok_or(ExecutionError::ExecutionNotFound(execution_id))?;
        if !execution.is_waiting() {
            return Err(ExecutionError::NotWaiting(execution_id));
        }
        let activity_id = execution.activity_id().to_string();
        let result = self.resume(execution_id, payload);
        if result.is_err() && self.wait_again(execution_id, &activity_id) {
            debug!(execution = %execution_id, "execution waits again after failed signal");
        }
        result
    }

    /// Put `execution` back into its wait state if a failed resume left it where it was.
    fn wait_again(&mut self, execution: ExecutionId, activity_id: &str) -> bool {
        let unchanged = self
            .state
            .tree
            .get(execution)
            .is_some_and(|current| current.activity_id() == activity_id && !current.is_waiting());
        if unchanged {
            self.state.tree.set_waiting(execution, true);
        }
        unchanged
    }

    fn resume(&mut self, execution: ExecutionId, payload: Option<Value>) -> Result<(), ExecutionError> {
        self.state.tree.set_waiting(execution, false);
        self.state.agenda.push(Operation::Trigger { execution, payload });
        self.run_agenda()
    }

    /// Variable `name` as seen by the process instance, also after it ended.
    pub fn variable(&self, process_instance: ExecutionId, name: &str) -> Option<Value> {
        if self.state.tree.contains(process_instance) {
            return self.state.tree.variable(process_instance, name);
        }
        self.state
            .ended
            .get(&process_instance)
            .and_then(|variables| variables.get(name).cloned())
    }

    /// All variables of the process instance's root scope.
    pub fn variables(&self, process_instance: ExecutionId) -> IndexMap<String, Value> {
        if self.state.tree.contains(process_instance) {
            return self.state.tree.visible_variables(process_instance);
        }
        self.state.ended.get(&process_instance).cloned().unwrap_or_default()
    }

    pub fn execution(&self, execution_id: ExecutionId) -> Option<&Execution> {
        self.state.tree.get(execution_id)
    }

    /// Live executions positioned at `activity_id`, in creation order.
    pub fn executions_at(&self, activity_id: &str) -> Vec<&Execution> {
        self.state
            .tree
            .iter()
            .filter(|execution| execution.activity_id() == activity_id)
            .collect()
    }

    pub fn is_ended(&self, process_instance: ExecutionId) -> bool {
        self.state.ended.contains_key(&process_instance)
    }

    pub fn history(&self) -> &[HistoryEvent] {
        self.state.history.events()
    }

    /// Forget an ended process instance: its final variables and its history events.
    ///
    /// Returns `false` when the instance is unknown or still running.
    pub fn prune_ended(&mut self, process_instance: ExecutionId) -> bool {
        if self.state.ended.shift_remove(&process_instance).is_none() {
            return false;
        }
        let events = self.state.history.remove_process_instance(process_instance);
        debug!(process_instance = %process_instance, events, "pruned ended process instance");
        true
    }

    fn run_agenda(&mut self) -> Result<(), ExecutionError> {
        let mut first_error = None;
        while let Some(operation) = self.state.agenda.pop() {
            let name = operation.name();
            let execution = operation.execution();
            let queued = self.state.agenda.len();
            let recorded = self.state.history.len();
            if let Err(error) = self.perform(operation) {
                warn!(operation = name, execution = %execution, error = %error, "operation failed; its follow-up work was discarded");
                self.state.agenda.truncate(queued);
                self.state.history.truncate(recorded);
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn perform(&mut self, operation: Operation) -> Result<(), ExecutionError> {
        let execution_id = operation.execution();
        let Some(execution) = self.state.tree.get(execution_id) else {
            debug!(operation = ?operation, "dropping operation for removed execution");
            return Ok(());
        };
        let definition_id = execution.definition_id().to_string();
        let activity_id = execution.activity_id().to_string();
        let loop_counter = loop_counter_of(execution.variable_local(LOOP_COUNTER));

        let definition = self
            .definitions
            .get(&definition_id)
            .cloned()
            .ok_or_else(|| ExecutionError::DefinitionNotFound(definition_id.clone()))?;
        let activity = definition
            .activity(&activity_id)
            .ok_or_else(|| ExecutionError::ActivityNotFound {
                definition_id: definition_id.clone(),
                activity_id: activity_id.clone(),
            })?;
        let mut context = ExecutionContext::new(&mut self.state, &definition, activity, &self.handlers, execution_id);

        match operation {
            Operation::ContinueFlow(_) => {
                continue_flow(&mut context);
                Ok(())
            }
            Operation::ExecuteBehavior { behavior, .. } => {
                context.record(HistoryEventKind::ActivityEntered {
                    activity_id,
                    execution: execution_id,
                    loop_counter,
                });
                behavior.execute(&mut context)
            }
            Operation::Leave(_) => {
                context.record(HistoryEventKind::ActivityLeft {
                    activity_id,
                    execution: execution_id,
                    loop_counter,
                });
                activity.behavior().leave(&mut context)
            }
            Operation::Trigger { payload, .. } => activity.behavior().trigger(&mut context, payload),
            Operation::TakeOutgoing(_) => {
                take_outgoing(&mut context);
                Ok(())
            }
        }
    }
}

/// Enter the activity. Scope activities run in a fresh child execution.
fn continue_flow(context: &mut ExecutionContext<'_>) {
    let execution = context.execution_id();
    let activity = context.activity();
    let behavior = activity.behavior().clone();
    if !activity.is_scope() {
        context.execute_behavior(execution, behavior);
        return;
    }

    let activity_id = activity.id().to_string();
    let state = context.state();
    match state.tree.create_child(execution, &activity_id, true, false) {
        Some(scope) => {
            state.tree.set_active(execution, false);
            context.execute_behavior(scope, behavior);
        }
        None => debug!(execution = %execution, "execution vanished before entering scope"),
    }
}

/// Leave the activity along its outgoing flow, tearing down its scope execution.
fn take_outgoing(context: &mut ExecutionContext<'_>) {
    let execution = context.execution_id();
    let outgoing = context.activity().outgoing().map(str::to_string);
    let definition_id = context.definition().id().to_string();
    let state = context.state();

    let Some(current) = state.tree.get(execution) else {
        return;
    };
    let mut flow_execution = execution;
    if current.is_scope()
        && let Some(parent) = current.parent()
    {
        state.tree.remove_subtree(execution);
        state.tasks.remove_for_execution(execution);
        state.tree.set_active(parent, true);
        flow_execution = parent;
    }

    match outgoing {
        Some(next) => {
            state.tree.set_activity(flow_execution, &next);
            state.agenda.push(Operation::ContinueFlow(flow_execution));
        }
        None => {
            let is_root = state.tree.get(flow_execution).is_some_and(Execution::is_process_instance);
            if is_root {
                end_process_instance(state, flow_execution, &definition_id);
            } else {
                debug!(execution = %flow_execution, "execution without outgoing flow removed");
                state.tree.remove_subtree(flow_execution);
            }
        }
    }
}

fn end_process_instance(state: &mut RuntimeState, process_instance: ExecutionId, definition_id: &str) {
    let variables = state.tree.visible_variables(process_instance);
    for removed in state.tree.remove_subtree(process_instance) {
        state.tasks.remove_for_execution(removed.id());
    }
    state.ended.insert(process_instance, variables);
    state.history.record(
        process_instance,
        HistoryEventKind::ProcessEnded {
            definition_id: definition_id.to_string(),
        },
    );
    info!(process_instance = %process_instance, definition_id = %definition_id, "process instance ended");
}
