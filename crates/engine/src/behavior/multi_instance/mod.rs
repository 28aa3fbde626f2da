//! Multi-instance activity runtime.
//!
//! The activity's scope execution acts as the loop root. On entry it receives
//! the local counters [`NUMBER_OF_INSTANCES`], [`NUMBER_OF_ACTIVE_INSTANCES`]
//! and [`NUMBER_OF_COMPLETED_INSTANCES`]; every instance then runs the inner
//! behavior in a child execution carrying [`LOOP_COUNTER`] and, when
//! configured, the bound collection element.
//!
//! Child completion is a single step on the agenda: counters are updated, the
//! completion condition is evaluated and the join decision is taken before any
//! other operation runs. A step that fails restores the counters and leaves the
//! child in place. Once the root is active again the activity has completed and
//! late completions are ignored.

mod mixed;
mod parallel;
mod sequential;

use std::fmt;

use serde_json::Value;
use tracing::{debug, info};

use manifold_types::MultiInstanceMode;

use crate::error::{ExecutionError, ExpressionError};
use crate::expression::{Expression, ExpressionManager, VariableScope, type_name};
use crate::runtime::{ExecutionContext, ExecutionId, HistoryEventKind, LOOP_COUNTER};

pub use mixed::MixedMultiInstanceBehavior;
pub use parallel::ParallelMultiInstanceBehavior;
pub use sequential::SequentialMultiInstanceBehavior;

pub const NUMBER_OF_INSTANCES: &str = "numberOfInstances";
pub const NUMBER_OF_ACTIVE_INSTANCES: &str = "numberOfActiveInstances";
pub const NUMBER_OF_COMPLETED_INSTANCES: &str = "numberOfCompletedInstances";

/// Where the collection iterated by a multi-instance activity comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionSource {
    /// Name of a process variable holding a list.
    Variable(String),
    /// Expression evaluating to a list.
    Expression(Expression),
}

impl CollectionSource {
    /// Text containing `{` is compiled as an expression, anything else names a variable.
    pub fn parse(text: &str, expressions: &ExpressionManager) -> Result<Self, ExpressionError> {
        if text.contains('{') {
            expressions.create_expression(text).map(Self::Expression)
        } else {
            Ok(Self::Variable(text.trim().to_string()))
        }
    }
}

/// Compiled loop configuration shared by both strategies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopSettings {
    pub loop_cardinality: Option<Expression>,
    pub completion_condition: Option<Expression>,
    pub collection: Option<CollectionSource>,
    pub element_variable: Option<String>,
}

/// How instances of a multi-instance activity are scheduled.
pub trait MultiInstanceStrategy: fmt::Debug + Send + Sync {
    fn mode(&self) -> MultiInstanceMode;

    /// Start instances below `root`. Counters are already initialised and `plan.count > 0`.
    fn create_instances(
        &self,
        context: &mut ExecutionContext<'_>,
        root: ExecutionId,
        settings: &LoopSettings,
        plan: &InstancePlan,
    ) -> Result<(), ExecutionError>;

    /// Instance `loop_counter` completed without completing the activity.
    ///
    /// Its child execution is removed only after this returns `Ok`.
    fn continue_after(
        &self,
        context: &mut ExecutionContext<'_>,
        root: ExecutionId,
        loop_counter: usize,
        settings: &LoopSettings,
    ) -> Result<(), ExecutionError>;
}

/// Instance count and, when a collection is bound, its elements.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancePlan {
    pub count: usize,
    pub elements: Option<Vec<Value>>,
}

impl InstancePlan {
    pub fn element(&self, index: usize) -> Option<&Value> {
        self.elements.as_ref().and_then(|elements| elements.get(index))
    }
}

/// Enter the activity on its scope execution.
pub(crate) fn enter(
    strategy: &dyn MultiInstanceStrategy,
    context: &mut ExecutionContext<'_>,
    settings: &LoopSettings,
) -> Result<(), ExecutionError> {
    let root = context.execution_id();
    let plan = resolve_instances(context, settings)?;

    context.set_variable_local(NUMBER_OF_INSTANCES, Value::from(plan.count));
    context.set_variable_local(NUMBER_OF_ACTIVE_INSTANCES, Value::from(plan.count));
    context.set_variable_local(NUMBER_OF_COMPLETED_INSTANCES, Value::from(0));
    info!(
        activity_id = %context.activity().id(),
        execution = %root,
        mode = %strategy.mode(),
        instances = plan.count,
        "multi-instance activity entered"
    );

    if plan.count == 0 {
        let activity_id = context.activity().id().to_string();
        context.record(HistoryEventKind::MultiInstanceCompleted {
            activity_id,
            execution: root,
            instances: 0,
            completed: 0,
            by_condition: false,
        });
        context.take_outgoing(root);
        return Ok(());
    }

    context.set_active(root, false);
    strategy.create_instances(context, root, settings, &plan)
}

/// Handle the completion of the child execution bound to `context`.
pub(crate) fn complete_instance(
    strategy: &dyn MultiInstanceStrategy,
    context: &mut ExecutionContext<'_>,
    settings: &LoopSettings,
) -> Result<(), ExecutionError> {
    let child = context.execution_id();
    let activity_id = context.activity().id();
    let Some(root) = context.parent_of(child) else {
        debug!(activity_id = %activity_id, execution = %child, "instance has no loop root; ignoring completion");
        return Ok(());
    };
    if context.is_active(root) != Some(false) {
        debug!(activity_id = %activity_id, execution = %child, "activity already completed; ignoring completion");
        return Ok(());
    }

    let instances = counter(context, root, NUMBER_OF_INSTANCES);
    let previous_active = counter(context, root, NUMBER_OF_ACTIVE_INSTANCES);
    let previous_completed = counter(context, root, NUMBER_OF_COMPLETED_INSTANCES);
    let active = previous_active.saturating_sub(1);
    let completed = previous_completed + 1;
    write_progress(context, root, active, completed);

    let loop_counter = counter(context, child, LOOP_COUNTER);
    let outcome = match &settings.completion_condition {
        Some(condition) => condition.get_boolean(&context.scope()),
        None => Ok(false),
    };
    let by_condition = match outcome {
        Ok(by_condition) => by_condition,
        Err(source) => {
            write_progress(context, root, previous_active, previous_completed);
            return Err(ExecutionError::evaluation(activity_id, "completion condition", source));
        }
    };
    debug!(
        activity_id = %activity_id,
        execution = %child,
        loop_counter,
        active,
        completed,
        instances,
        by_condition,
        "instance completed"
    );

    if by_condition || completed >= instances {
        for sibling in context.children(root) {
            context.remove_execution(sibling, sibling != child);
        }
        context.set_active(root, true);
        context.record(HistoryEventKind::MultiInstanceCompleted {
            activity_id: activity_id.to_string(),
            execution: root,
            instances,
            completed,
            by_condition,
        });
        info!(
            activity_id = %activity_id,
            execution = %root,
            completed,
            instances,
            by_condition,
            "multi-instance activity completed"
        );
        context.take_outgoing(root);
        return Ok(());
    }

    // The finished child stays until its successor exists, so a failed step can be retried.
    if let Err(error) = strategy.continue_after(context, root, loop_counter, settings) {
        write_progress(context, root, previous_active, previous_completed);
        return Err(error);
    }
    context.remove_execution(child, false);
    Ok(())
}

fn write_progress(context: &mut ExecutionContext<'_>, root: ExecutionId, active: usize, completed: usize) {
    context.set_variable_local_on(root, NUMBER_OF_ACTIVE_INSTANCES, Value::from(active));
    context.set_variable_local_on(root, NUMBER_OF_COMPLETED_INSTANCES, Value::from(completed));
}

/// Create the child execution for instance `index` with its local bindings.
pub(crate) fn spawn_instance(
    context: &mut ExecutionContext<'_>,
    root: ExecutionId,
    index: usize,
    element: Option<&Value>,
    settings: &LoopSettings,
    is_concurrent: bool,
) -> Result<ExecutionId, ExecutionError> {
    let child = context.create_child(root, is_concurrent)?;
    context.set_variable_local_on(child, LOOP_COUNTER, Value::from(index));
    if let (Some(name), Some(element)) = (&settings.element_variable, element) {
        context.set_variable_local_on(child, name, element.clone());
    }
    Ok(child)
}

fn resolve_instances(context: &ExecutionContext<'_>, settings: &LoopSettings) -> Result<InstancePlan, ExecutionError> {
    let activity_id = context.activity().id();
    let scope = context.scope();

    let cardinality = match &settings.loop_cardinality {
        Some(expression) => {
            let value = expression
                .get_value(&scope)
                .map_err(|source| ExecutionError::evaluation(activity_id, "loop cardinality", source))?;
            Some(parse_cardinality(activity_id, &value)?)
        }
        None => None,
    };
    let elements = match &settings.collection {
        Some(source) => Some(resolve_collection(activity_id, source, &scope)?),
        None => None,
    };

    let count = match (cardinality, &elements) {
        (Some(cardinality), Some(elements)) if cardinality > elements.len() => {
            return Err(ExecutionError::CardinalityExceedsCollection {
                activity_id: activity_id.to_string(),
                cardinality,
                size: elements.len(),
            });
        }
        (Some(cardinality), _) => cardinality,
        (None, Some(elements)) => elements.len(),
        (None, None) => {
            return Err(ExecutionError::InvalidCardinality {
                activity_id: activity_id.to_string(),
                value: "neither loop cardinality nor collection is configured".to_string(),
            });
        }
    };

    let limit = context.config().max_instances;
    if count > limit {
        return Err(ExecutionError::TooManyInstances {
            activity_id: activity_id.to_string(),
            requested: count,
            limit,
        });
    }
    Ok(InstancePlan { count, elements })
}

/// Evaluate the collection into its elements.
pub(crate) fn resolve_collection(
    activity_id: &str,
    source: &CollectionSource,
    scope: &dyn VariableScope,
) -> Result<Vec<Value>, ExecutionError> {
    let value = match source {
        CollectionSource::Variable(name) => scope.variable(name).ok_or_else(|| ExecutionError::CollectionNotFound {
            activity_id: activity_id.to_string(),
            variable: name.clone(),
        })?,
        CollectionSource::Expression(expression) => expression
            .get_value(scope)
            .map_err(|source| ExecutionError::evaluation(activity_id, "collection", source))?,
    };
    match value {
        Value::Array(elements) => Ok(elements),
        other => Err(ExecutionError::NotACollection {
            activity_id: activity_id.to_string(),
            found: type_name(&other),
        }),
    }
}

/// Accepts non-negative integers, integral floats and numeric text.
fn parse_cardinality(activity_id: &str, value: &Value) -> Result<usize, ExecutionError> {
    let parsed = match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| *float >= 0.0 && float.fract() == 0.0 && *float <= u64::MAX as f64)
                .map(|float| float as u64)
        }),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|count| usize::try_from(count).ok())
        .ok_or_else(|| ExecutionError::InvalidCardinality {
            activity_id: activity_id.to_string(),
            value: value.to_string(),
        })
}

fn counter(context: &ExecutionContext<'_>, execution: ExecutionId, name: &str) -> usize {
    context
        .variable_local_of(execution, name)
        .and_then(|value| value.as_u64())
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(0)
}
