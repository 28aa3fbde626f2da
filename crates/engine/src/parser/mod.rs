//! Turns [`ProcessModel`]s into executable [`ProcessDefinition`]s.
//!
//! Parsing has two outcomes that are kept apart:
//! - model problems (dangling references, unusable loop declarations) are
//!   collected in [`Diagnostics`] and parsing continues so every problem surfaces
//! - expressions that do not compile abort with a [`ParseError`]

mod definition;
mod multi_instance;

use std::sync::Arc;

use tracing::debug;

use manifold_types::process::validation::validate_structure;
use manifold_types::{FlowNode, FlowNodeKind, Problem, ProcessModel, UserTaskAssignment};

use crate::behavior::{ActivityBehaviorFactory, DefaultActivityBehaviorFactory};
use crate::error::ParseError;
use crate::expression::{Expression, ExpressionManager};

pub use definition::{ActivityDefinition, PROPERTY_MULTI_INSTANCE, ProcessDefinition, TaskDefinition};

/// Accumulates non-fatal model problems.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    problems: Vec<Problem>,
}

impl Diagnostics {
    pub fn add_problem(&mut self, message: impl Into<String>, element_id: Option<&str>) {
        let problem = Problem::new(message, element_id);
        debug!(problem = %problem, "model problem recorded");
        self.problems.push(problem);
    }

    pub fn extend(&mut self, problems: impl IntoIterator<Item = Problem>) {
        self.problems.extend(problems);
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn into_problems(self) -> Vec<Problem> {
        self.problems
    }
}

/// State shared by the handlers while one model is parsed.
pub struct ParseContext<'a> {
    pub(crate) expressions: &'a ExpressionManager,
    pub(crate) factory: &'a dyn ActivityBehaviorFactory,
    pub(crate) definition: ProcessDefinition,
    pub(crate) diagnostics: Diagnostics,
}

impl<'a> ParseContext<'a> {
    pub(crate) fn new(
        expressions: &'a ExpressionManager,
        factory: &'a dyn ActivityBehaviorFactory,
        definition: ProcessDefinition,
    ) -> Self {
        Self {
            expressions,
            factory,
            definition,
            diagnostics: Diagnostics::default(),
        }
    }

    pub(crate) fn compile(&self, element_id: &str, source: &str) -> Result<Expression, ParseError> {
        self.expressions
            .create_expression(source)
            .map_err(|source| ParseError::Expression {
                element_id: element_id.to_string(),
                source,
            })
    }
}

/// Result of parsing one model.
#[derive(Debug, Clone)]
pub struct ParsedProcess {
    pub definition: ProcessDefinition,
    pub problems: Vec<Problem>,
}

impl ParsedProcess {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessParser {
    expressions: ExpressionManager,
    factory: Arc<dyn ActivityBehaviorFactory>,
}

impl Default for ProcessParser {
    fn default() -> Self {
        Self::new(Arc::new(DefaultActivityBehaviorFactory))
    }
}

impl ProcessParser {
    pub fn new(factory: Arc<dyn ActivityBehaviorFactory>) -> Self {
        Self {
            expressions: ExpressionManager::new(),
            factory,
        }
    }

    pub fn parse(&self, model: &ProcessModel) -> Result<ParsedProcess, ParseError> {
        let mut context = ParseContext::new(
            &self.expressions,
            self.factory.as_ref(),
            ProcessDefinition::new(&model.id, model.name.as_deref()),
        );
        context.diagnostics.extend(validate_structure(model));
        context.definition.set_initial(model.start_node_id());
        for (name, value) in &model.properties {
            context.definition.set_property(name, value.clone());
        }

        for node in &model.nodes {
            if !node.id.trim().is_empty() {
                parse_activity(&mut context, node)?;
            }
            if let Some(loop_characteristics) = &node.loop_characteristics {
                multi_instance::create_multi_instance_loop_characteristics(&mut context, node, loop_characteristics)?;
            }
        }

        debug!(
            process_id = %model.id,
            activities = context.definition.activities().count(),
            problems = context.diagnostics.problems().len(),
            "parsed process"
        );
        Ok(ParsedProcess {
            definition: context.definition,
            problems: context.diagnostics.into_problems(),
        })
    }
}

fn parse_activity(context: &mut ParseContext<'_>, node: &FlowNode) -> Result<(), ParseError> {
    let factory = context.factory;
    let behavior = match &node.kind {
        FlowNodeKind::UserTask(_) => factory.create_user_task_behavior(node),
        FlowNodeKind::ServiceTask {
            handler,
            result_variable,
        } => {
            if handler.trim().is_empty() {
                context
                    .diagnostics
                    .add_problem(format!("Service task '{}' does not name a handler", node.id), Some(&node.id));
            }
            factory.create_service_task_behavior(node, handler.trim(), result_variable.as_deref())
        }
        FlowNodeKind::ManualTask => factory.create_manual_task_behavior(node),
        FlowNodeKind::ReceiveTask => factory.create_receive_task_behavior(node),
    };

    let mut activity = ActivityDefinition::new(&node.id, node.name.as_deref(), node.outgoing.as_deref(), behavior);
    if let FlowNodeKind::UserTask(assignment) = &node.kind {
        activity.set_task_definition(parse_task_definition(context, &node.id, assignment)?);
    }
    context.definition.add_activity(activity);
    Ok(())
}

fn parse_task_definition(
    context: &ParseContext<'_>,
    element_id: &str,
    assignment: &UserTaskAssignment,
) -> Result<TaskDefinition, ParseError> {
    let mut task_definition = TaskDefinition::default();
    if let Some(assignee) = assignment.assignee.as_deref().filter(|text| !text.trim().is_empty()) {
        task_definition.set_assignee_expression(Some(context.compile(element_id, assignee.trim())?));
    }
    for user in assignment.candidate_users.iter().filter(|text| !text.trim().is_empty()) {
        task_definition.add_candidate_user_expression(context.compile(element_id, user.trim())?);
    }
    for group in assignment.candidate_groups.iter().filter(|text| !text.trim().is_empty()) {
        task_definition.add_candidate_group_expression(context.compile(element_id, group.trim())?);
    }
    Ok(task_definition)
}
