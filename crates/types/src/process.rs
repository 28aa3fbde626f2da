//! Strongly typed process declarations consumed by the engine's parser.
//!
//! A [`ProcessModel`] is the output of a document loader: an ordered list of
//! flow nodes, each optionally carrying [`LoopCharacteristics`]. Authoring order
//! is preserved so the first node can act as the default entry point.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod validation;

/// Declarative process definition ready for parsing into an executable form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessModel {
    /// Canonical process identifier used as deployment key.
    pub id: String,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Identifier of the node the process starts at. Defaults to the first node.
    #[serde(default)]
    pub start: Option<String>,
    /// Flow nodes in authoring order.
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    /// Free-form metadata carried through to the definition.
    #[serde(default)]
    pub properties: IndexMap<String, JsonValue>,
}

impl ProcessModel {
    /// Returns the node identifier execution starts at.
    pub fn start_node_id(&self) -> Option<&str> {
        self.start.as_deref().or_else(|| self.nodes.first().map(|node| node.id.as_str()))
    }

    /// Looks up a node by identifier.
    pub fn node(&self, node_id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|node| node.id == node_id)
    }
}

/// A single activity within a process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowNode {
    /// Unique node identifier.
    pub id: String,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Activity kind and its kind-specific configuration.
    #[serde(flatten)]
    pub kind: FlowNodeKind,
    /// Multi-instance declaration, when the activity loops.
    #[serde(default, rename = "multi_instance", alias = "loop_characteristics")]
    pub loop_characteristics: Option<LoopCharacteristics>,
    /// Identifier of the node control flows to once this one completes.
    #[serde(default)]
    pub outgoing: Option<String>,
}

impl FlowNode {
    /// Returns true when the node is a user task.
    pub fn is_user_task(&self) -> bool {
        matches!(self.kind, FlowNodeKind::UserTask(_))
    }
}

/// Supported activity kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowNodeKind {
    /// Human task that waits until completed through the task API.
    UserTask(UserTaskAssignment),
    /// Automated task delegating to a registered handler.
    ServiceTask {
        /// Name of the handler registered with the engine.
        handler: String,
        /// Variable receiving the handler result, when set.
        #[serde(default)]
        result_variable: Option<String>,
    },
    /// Task that completes as soon as it is entered.
    ManualTask,
    /// Wait state resumed by an external signal.
    ReceiveTask,
}

/// Human assignment of a user task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserTaskAssignment {
    /// Assignee expression or literal user id.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Candidate user expressions.
    #[serde(default)]
    pub candidate_users: Vec<String>,
    /// Candidate group expressions.
    #[serde(default)]
    pub candidate_groups: Vec<String>,
}

/// Multi-instance loop declaration attached to an activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopCharacteristics {
    /// Run instances one after another instead of all at once.
    #[serde(default)]
    pub sequential: bool,
    /// Expression yielding the number of instances.
    #[serde(default)]
    pub loop_cardinality: Option<String>,
    /// Expression evaluated after each instance completes; true ends the loop.
    #[serde(default)]
    pub completion_condition: Option<String>,
    /// Collection variable name or collection expression.
    #[serde(default, alias = "input_data_item", alias = "collection")]
    pub input_collection: Option<String>,
    /// Variable each instance receives its collection element under.
    #[serde(default)]
    pub element_variable: Option<String>,
}

impl LoopCharacteristics {
    /// Declared execution mode.
    pub fn mode(&self) -> MultiInstanceMode {
        if self.sequential {
            MultiInstanceMode::Sequential
        } else {
            MultiInstanceMode::Parallel
        }
    }

    pub fn loop_cardinality(&self) -> Option<&str> {
        non_empty(self.loop_cardinality.as_deref())
    }

    pub fn completion_condition(&self) -> Option<&str> {
        non_empty(self.completion_condition.as_deref())
    }

    pub fn input_collection(&self) -> Option<&str> {
        non_empty(self.input_collection.as_deref())
    }

    pub fn element_variable(&self) -> Option<&str> {
        non_empty(self.element_variable.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

/// Execution mode recorded on multi-instance activities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MultiInstanceMode {
    Sequential,
    Parallel,
}

impl MultiInstanceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }
}

impl fmt::Display for MultiInstanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
