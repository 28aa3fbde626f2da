//! Executable process definitions produced by the parser.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::behavior::ActivityBehavior;
use crate::expression::Expression;

/// Property recording the multi-instance mode of an activity.
pub const PROPERTY_MULTI_INSTANCE: &str = "multiInstance";

#[derive(Debug, Clone)]
pub struct ProcessDefinition {
    id: String,
    name: Option<String>,
    initial: Option<String>,
    activities: IndexMap<String, ActivityDefinition>,
    properties: IndexMap<String, Value>,
}

impl ProcessDefinition {
    pub fn new(id: &str, name: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.map(str::to_string),
            initial: None,
            activities: IndexMap::new(),
            properties: IndexMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Activity new process instances start at.
    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    pub fn set_initial(&mut self, activity_id: Option<&str>) {
        self.initial = activity_id.map(str::to_string);
    }

    pub fn activity(&self, activity_id: &str) -> Option<&ActivityDefinition> {
        self.activities.get(activity_id)
    }

    pub fn activity_mut(&mut self, activity_id: &str) -> Option<&mut ActivityDefinition> {
        self.activities.get_mut(activity_id)
    }

    pub fn activities(&self) -> impl Iterator<Item = &ActivityDefinition> {
        self.activities.values()
    }

    /// Add an activity. An existing activity with the same id is kept.
    pub fn add_activity(&mut self, activity: ActivityDefinition) -> bool {
        if self.activities.contains_key(&activity.id) {
            return false;
        }
        self.activities.insert(activity.id.clone(), activity);
        true
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_string(), value);
    }
}

/// One activity of a definition with its effective behavior.
#[derive(Debug, Clone)]
pub struct ActivityDefinition {
    id: String,
    name: Option<String>,
    outgoing: Option<String>,
    scope: bool,
    properties: IndexMap<String, Value>,
    behavior: Arc<dyn ActivityBehavior>,
    task_definition: Option<TaskDefinition>,
}

impl ActivityDefinition {
    pub fn new(id: &str, name: Option<&str>, outgoing: Option<&str>, behavior: Arc<dyn ActivityBehavior>) -> Self {
        Self {
            id: id.to_string(),
            name: name.map(str::to_string),
            outgoing: outgoing.map(str::to_string),
            scope: false,
            properties: IndexMap::new(),
            behavior,
            task_definition: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn outgoing(&self) -> Option<&str> {
        self.outgoing.as_deref()
    }

    /// Scope activities run in an execution of their own.
    pub fn is_scope(&self) -> bool {
        self.scope
    }

    pub fn set_scope(&mut self, scope: bool) {
        self.scope = scope;
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_string(), value);
    }

    pub fn behavior(&self) -> &Arc<dyn ActivityBehavior> {
        &self.behavior
    }

    pub fn set_activity_behavior(&mut self, behavior: Arc<dyn ActivityBehavior>) {
        self.behavior = behavior;
    }

    pub fn task_definition(&self) -> Option<&TaskDefinition> {
        self.task_definition.as_ref()
    }

    pub fn task_definition_mut(&mut self) -> Option<&mut TaskDefinition> {
        self.task_definition.as_mut()
    }

    pub fn set_task_definition(&mut self, task_definition: TaskDefinition) {
        self.task_definition = Some(task_definition);
    }
}

/// Compiled human assignment of a user task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDefinition {
    assignee_expression: Option<Expression>,
    candidate_user_expressions: Vec<Expression>,
    candidate_group_expressions: Vec<Expression>,
}

impl TaskDefinition {
    pub fn assignee_expression(&self) -> Option<&Expression> {
        self.assignee_expression.as_ref()
    }

    pub fn set_assignee_expression(&mut self, expression: Option<Expression>) {
        self.assignee_expression = expression;
    }

    pub fn candidate_user_expressions(&self) -> &[Expression] {
        &self.candidate_user_expressions
    }

    pub fn add_candidate_user_expression(&mut self, expression: Expression) {
        self.candidate_user_expressions.push(expression);
    }

    pub fn candidate_group_expressions(&self) -> &[Expression] {
        &self.candidate_group_expressions
    }

    pub fn add_candidate_group_expression(&mut self, expression: Expression) {
        self.candidate_group_expressions.push(expression);
    }

    /// True when nothing claims the task yet.
    pub fn is_unassigned(&self) -> bool {
        self.assignee_expression.is_none()
            && self.candidate_user_expressions.is_empty()
            && self.candidate_group_expressions.is_empty()
    }
}
