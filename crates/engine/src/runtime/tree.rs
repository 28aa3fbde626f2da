//! In-memory execution tree.
//!
//! Every process instance is a root execution. Scope activities get a child
//! execution of their own, and multi-instance activities hang one concurrent
//! child per instance below that scope. Variables live on the execution that
//! defines them; lookups walk towards the root.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expression::VariableScope;

/// Identifier of an execution. Process instances are identified by their root execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(u64);

impl ExecutionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ExecutionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A path of control through a process definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    id: ExecutionId,
    parent: Option<ExecutionId>,
    process_instance: ExecutionId,
    definition_id: String,
    activity_id: String,
    is_scope: bool,
    is_active: bool,
    is_concurrent: bool,
    #[serde(skip)]
    waiting: bool,
    variables: IndexMap<String, Value>,
}

impl Execution {
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn parent(&self) -> Option<ExecutionId> {
        self.parent
    }

    pub fn process_instance(&self) -> ExecutionId {
        self.process_instance
    }

    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn is_scope(&self) -> bool {
        self.is_scope
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_concurrent(&self) -> bool {
        self.is_concurrent
    }

    /// True while the execution sits in a wait state.
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn is_process_instance(&self) -> bool {
        self.parent.is_none()
    }

    /// Variables defined directly on this execution.
    pub fn variables_local(&self) -> &IndexMap<String, Value> {
        &self.variables
    }

    pub fn variable_local(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ExecutionTree {
    executions: IndexMap<ExecutionId, Execution>,
    next_id: u64,
}

impl ExecutionTree {
    fn allocate_id(&mut self) -> ExecutionId {
        self.next_id += 1;
        ExecutionId(self.next_id)
    }

    pub(crate) fn create_process_instance(
        &mut self,
        definition_id: &str,
        activity_id: &str,
        variables: IndexMap<String, Value>,
    ) -> ExecutionId {
        let id = self.allocate_id();
        self.executions.insert(
            id,
            Execution {
                id,
                parent: None,
                process_instance: id,
                definition_id: definition_id.to_string(),
                activity_id: activity_id.to_string(),
                is_scope: true,
                is_active: true,
                is_concurrent: false,
                waiting: false,
                variables,
            },
        );
        id
    }

    /// Create a child positioned at `activity_id`. Returns `None` when the parent is gone.
    pub(crate) fn create_child(
        &mut self,
        parent: ExecutionId,
        activity_id: &str,
        is_scope: bool,
        is_concurrent: bool,
    ) -> Option<ExecutionId> {
        let (process_instance, definition_id) = {
            let parent_execution = self.executions.get(&parent)?;
            (parent_execution.process_instance, parent_execution.definition_id.clone())
        };
        let id = self.allocate_id();
        self.executions.insert(
            id,
            Execution {
                id,
                parent: Some(parent),
                process_instance,
                definition_id,
                activity_id: activity_id.to_string(),
                is_scope,
                is_active: true,
                is_concurrent,
                waiting: false,
                variables: IndexMap::new(),
            },
        );
        Some(id)
    }

    pub(crate) fn get(&self, id: ExecutionId) -> Option<&Execution> {
        self.executions.get(&id)
    }

    pub(crate) fn contains(&self, id: ExecutionId) -> bool {
        self.executions.contains_key(&id)
    }

    pub(crate) fn set_active(&mut self, id: ExecutionId, active: bool) {
        if let Some(execution) = self.executions.get_mut(&id) {
            execution.is_active = active;
        }
    }

    pub(crate) fn set_waiting(&mut self, id: ExecutionId, waiting: bool) {
        if let Some(execution) = self.executions.get_mut(&id) {
            execution.waiting = waiting;
        }
    }

    pub(crate) fn set_activity(&mut self, id: ExecutionId, activity_id: &str) {
        if let Some(execution) = self.executions.get_mut(&id) {
            execution.activity_id = activity_id.to_string();
        }
    }

    /// Direct children of `parent` in creation order.
    pub(crate) fn children(&self, parent: ExecutionId) -> Vec<ExecutionId> {
        self.executions
            .values()
            .filter(|execution| execution.parent == Some(parent))
            .map(|execution| execution.id)
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Execution> {
        self.executions.values()
    }

    /// Remove `id` and all of its descendants, deepest first.
    pub(crate) fn remove_subtree(&mut self, id: ExecutionId) -> Vec<Execution> {
        let mut removed = Vec::new();
        for child in self.children(id) {
            removed.extend(self.remove_subtree(child));
        }
        if let Some(execution) = self.executions.shift_remove(&id) {
            removed.push(execution);
        }
        removed
    }

    /// Resolve `name` on `id` or the nearest ancestor defining it.
    pub(crate) fn variable(&self, id: ExecutionId, name: &str) -> Option<Value> {
        let mut current = self.executions.get(&id);
        while let Some(execution) = current {
            if let Some(value) = execution.variables.get(name) {
                return Some(value.clone());
            }
            current = execution.parent.and_then(|parent| self.executions.get(&parent));
        }
        None
    }

    /// Update the nearest execution defining `name`, else the process instance.
    pub(crate) fn set_variable(&mut self, id: ExecutionId, name: &str, value: Value) {
        let mut target = None;
        let mut current = self.executions.get(&id);
        while let Some(execution) = current {
            if execution.variables.contains_key(name) {
                target = Some(execution.id);
                break;
            }
            current = execution.parent.and_then(|parent| self.executions.get(&parent));
        }
        let target = target.or_else(|| self.executions.get(&id).map(|execution| execution.process_instance));
        if let Some(target) = target {
            self.set_variable_local(target, name, value);
        }
    }

    pub(crate) fn set_variable_local(&mut self, id: ExecutionId, name: &str, value: Value) {
        if let Some(execution) = self.executions.get_mut(&id) {
            execution.variables.insert(name.to_string(), value);
        }
    }

    /// Every variable visible from `id`, with nearer definitions shadowing outer ones.
    pub(crate) fn visible_variables(&self, id: ExecutionId) -> IndexMap<String, Value> {
        let mut chain = Vec::new();
        let mut current = self.executions.get(&id);
        while let Some(execution) = current {
            chain.push(execution);
            current = execution.parent.and_then(|parent| self.executions.get(&parent));
        }
        let mut variables = IndexMap::new();
        for execution in chain.into_iter().rev() {
            for (name, value) in &execution.variables {
                variables.insert(name.clone(), value.clone());
            }
        }
        variables
    }

    pub(crate) fn scope(&self, id: ExecutionId) -> ScopeView<'_> {
        ScopeView { tree: self, execution: id }
    }
}

/// Variable view rooted at one execution.
#[derive(Clone, Copy)]
pub struct ScopeView<'a> {
    tree: &'a ExecutionTree,
    execution: ExecutionId,
}

impl VariableScope for ScopeView<'_> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.tree.variable(self.execution, name)
    }
}
