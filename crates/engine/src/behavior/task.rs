use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ExecutionError;
use crate::expression::{Expression, VariableScope, format_json_value};
use crate::runtime::{ExecutionContext, NewTask};

use super::ActivityBehavior;

/// Executes the work behind a service task.
///
/// Engines register implementations under a name; service tasks refer to that name.
pub trait TaskHandler: Send + Sync {
    /// Run the handler for `activity_id` with read-only access to the visible variables.
    fn execute(&self, activity_id: &str, variables: &dyn VariableScope) -> Result<Value>;
}

impl<F> TaskHandler for F
where
    F: Fn(&str, &dyn VariableScope) -> Result<Value> + Send + Sync,
{
    fn execute(&self, activity_id: &str, variables: &dyn VariableScope) -> Result<Value> {
        self(activity_id, variables)
    }
}

/// A handler that returns a synthetic payload naming the activity. Useful for previews and tests.
pub struct NoopHandler;

impl TaskHandler for NoopHandler {
    fn execute(&self, activity_id: &str, _variables: &dyn VariableScope) -> Result<Value> {
        let mut object = serde_json::Map::new();
        object.insert("activity_id".into(), Value::String(activity_id.to_string()));
        Ok(Value::Object(object))
    }
}

/// Creates a task and waits until it is completed.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserTaskBehavior;

impl ActivityBehavior for UserTaskBehavior {
    fn execute(&self, context: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let activity = context.activity();
        let mut task = NewTask {
            name: activity.name().map(str::to_string),
            ..NewTask::default()
        };

        if let Some(task_definition) = activity.task_definition() {
            let scope = context.scope();
            if let Some(expression) = task_definition.assignee_expression() {
                task.assignee = evaluate_identities(activity.id(), "assignee", expression, &scope)?.into_iter().next();
            }
            for expression in task_definition.candidate_user_expressions() {
                task.candidate_users
                    .extend(evaluate_identities(activity.id(), "candidate users", expression, &scope)?);
            }
            for expression in task_definition.candidate_group_expressions() {
                task.candidate_groups
                    .extend(evaluate_identities(activity.id(), "candidate groups", expression, &scope)?);
            }
        }

        let assignee = task.assignee.clone();
        let task_id = context.create_task(task);
        context.wait();
        info!(
            activity_id = %activity.id(),
            execution = %context.execution_id(),
            task_id,
            assignee = assignee.as_deref().unwrap_or(""),
            "user task created"
        );
        Ok(())
    }

    fn trigger(&self, context: &mut ExecutionContext<'_>, _payload: Option<Value>) -> Result<(), ExecutionError> {
        context.leave();
        Ok(())
    }
}

/// Identity lists accept either a JSON list or comma separated text.
fn evaluate_identities(
    activity_id: &str,
    purpose: &'static str,
    expression: &Expression,
    scope: &dyn VariableScope,
) -> Result<Vec<String>, ExecutionError> {
    let value = expression
        .get_value(scope)
        .map_err(|source| ExecutionError::evaluation(activity_id, purpose, source))?;
    let identities = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(format_json_value).collect(),
        Value::String(text) => text.split(',').map(|identity| identity.trim().to_string()).collect(),
        other => vec![format_json_value(&other)],
    };
    Ok(identities.into_iter().filter(|identity| !identity.is_empty()).collect())
}

/// Calls a registered [`TaskHandler`] and leaves.
#[derive(Debug, Clone)]
pub struct ServiceTaskBehavior {
    handler: String,
    result_variable: Option<String>,
}

impl ServiceTaskBehavior {
    pub fn new(handler: &str, result_variable: Option<&str>) -> Self {
        Self {
            handler: handler.to_string(),
            result_variable: result_variable.map(str::to_string),
        }
    }
}

impl ActivityBehavior for ServiceTaskBehavior {
    fn execute(&self, context: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let activity_id = context.activity().id();
        let handler = context.handler(&self.handler).ok_or_else(|| ExecutionError::UnknownHandler {
            activity_id: activity_id.to_string(),
            handler: self.handler.clone(),
        })?;

        debug!(activity_id = %activity_id, handler = %self.handler, execution = %context.execution_id(), "invoking handler");
        let result = handler
            .execute(activity_id, &context.scope())
            .map_err(|error| ExecutionError::Handler {
                activity_id: activity_id.to_string(),
                handler: self.handler.clone(),
                message: format!("{error:#}"),
            })?;

        if let Some(variable) = &self.result_variable {
            context.set_variable(variable, result);
        }
        context.leave();
        Ok(())
    }
}

/// Completes as soon as it is entered.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualTaskBehavior;

impl ActivityBehavior for ManualTaskBehavior {
    fn execute(&self, context: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        context.leave();
        Ok(())
    }
}

/// Waits for [`ProcessEngine::signal`](crate::ProcessEngine::signal).
///
/// An object payload is stored as variables before leaving.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReceiveTaskBehavior;

impl ActivityBehavior for ReceiveTaskBehavior {
    fn execute(&self, context: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        context.wait();
        debug!(activity_id = %context.activity().id(), execution = %context.execution_id(), "waiting for signal");
        Ok(())
    }

    fn trigger(&self, context: &mut ExecutionContext<'_>, payload: Option<Value>) -> Result<(), ExecutionError> {
        if let Some(Value::Object(variables)) = payload {
            for (name, value) in variables {
                context.set_variable(&name, value);
            }
        }
        context.leave();
        Ok(())
    }
}
