//! Turns loop characteristics into a multi-instance behavior.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use manifold_types::{FlowNode, LoopCharacteristics};

use crate::behavior::{CollectionSource, MixedMultiInstanceBehavior};
use crate::error::ParseError;

use super::ParseContext;
use super::definition::PROPERTY_MULTI_INSTANCE;

/// Wrap the behavior of `node`'s activity in a multi-instance behavior.
///
/// Model problems are recorded on the context and leave the activity untouched.
/// Expressions that do not compile fail the parse.
pub(crate) fn create_multi_instance_loop_characteristics(
    context: &mut ParseContext<'_>,
    node: &FlowNode,
    loop_characteristics: &LoopCharacteristics,
) -> Result<(), ParseError> {
    let Some(activity) = context.definition.activity(&node.id) else {
        context.diagnostics.add_problem(
            format!("Activity '{}' needed for multi instance cannot be found", node.id),
            Some(&node.id),
        );
        return Ok(());
    };

    let mode = loop_characteristics.mode();
    let inner = activity.behavior().clone();
    let parallel = context.factory.create_parallel_multi_instance_behavior(activity, inner.clone());
    let sequential = context.factory.create_sequential_multi_instance_behavior(activity, inner.clone());
    let mut behavior = MixedMultiInstanceBehavior::new(mode, parallel, sequential, inner);

    behavior.set_loop_cardinality_expression(
        loop_characteristics
            .loop_cardinality()
            .map(|source| context.compile(&node.id, source))
            .transpose()?,
    );
    behavior.set_completion_condition_expression(
        loop_characteristics
            .completion_condition()
            .map(|source| context.compile(&node.id, source))
            .transpose()?,
    );
    behavior.set_collection(
        loop_characteristics
            .input_collection()
            .map(|text| CollectionSource::parse(text, context.expressions))
            .transpose()
            .map_err(|source| ParseError::Expression {
                element_id: node.id.clone(),
                source,
            })?,
    );
    let element_variable = loop_characteristics.element_variable().map(|name| name.trim().to_string());
    behavior.set_element_variable(element_variable.clone());

    let settings = behavior.settings();
    let mut valid = true;
    if settings.loop_cardinality.is_none() && settings.collection.is_none() {
        context.diagnostics.add_problem(
            format!("Either a loop cardinality or a collection must be set on multi-instance activity '{}'", node.id),
            Some(&node.id),
        );
        valid = false;
    }
    if settings.collection.is_none() && element_variable.is_some() {
        context.diagnostics.add_problem(
            format!("A collection must be set when using an element variable on activity '{}'", node.id),
            Some(&node.id),
        );
        valid = false;
    }
    if !valid {
        return Ok(());
    }

    let assignee_expression = match &element_variable {
        Some(name) if node.is_user_task() => Some(context.compile(&node.id, &format!("${{{name}}}"))?),
        _ => None,
    };

    let Some(activity) = context.definition.activity_mut(&node.id) else {
        return Ok(());
    };
    activity.set_scope(true);
    activity.set_property(PROPERTY_MULTI_INSTANCE, Value::String(mode.as_str().to_string()));
    if let Some(expression) = assignee_expression
        && let Some(task_definition) = activity.task_definition_mut()
        && task_definition.is_unassigned()
    {
        debug!(activity_id = %node.id, assignee = %expression, "assigning instances to the element variable");
        task_definition.set_assignee_expression(Some(expression));
    }
    activity.set_activity_behavior(Arc::new(behavior));
    debug!(activity_id = %node.id, mode = %mode, "multi-instance behavior attached");
    Ok(())
}

#[cfg(test)]
mod tests {
    use manifold_types::{FlowNodeKind, UserTaskAssignment};

    use super::*;
    use crate::behavior::DefaultActivityBehaviorFactory;
    use crate::expression::ExpressionManager;
    use crate::parser::ProcessDefinition;

    fn node(id: &str) -> FlowNode {
        FlowNode {
            id: id.to_string(),
            name: None,
            kind: FlowNodeKind::UserTask(UserTaskAssignment::default()),
            loop_characteristics: None,
            outgoing: None,
        }
    }

    #[test]
    fn missing_activity_is_a_problem_not_an_error() {
        let expressions = ExpressionManager::new();
        let factory = DefaultActivityBehaviorFactory;
        let mut context = ParseContext::new(&expressions, &factory, ProcessDefinition::new("p", None));
        let loop_characteristics = LoopCharacteristics {
            loop_cardinality: Some("3".into()),
            ..LoopCharacteristics::default()
        };

        create_multi_instance_loop_characteristics(&mut context, &node("ghost"), &loop_characteristics)
            .expect("problems are not errors");

        let problems = context.diagnostics.problems();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].message.contains("needed for multi instance cannot be found"));
        assert_eq!(problems[0].element_id.as_deref(), Some("ghost"));
    }
}
