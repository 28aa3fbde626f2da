use std::fmt;

use serde::{Deserialize, Serialize};

/// A non-fatal model problem discovered while building a process definition.
///
/// Problems never abort parsing; they are accumulated so every issue in a
/// document can be surfaced at once. A definition with at least one problem
/// must not be deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Human-readable description.
    pub message: String,
    /// Identifier of the model element the problem is attached to, if any.
    #[serde(default)]
    pub element_id: Option<String>,
}

impl Problem {
    pub fn new(message: impl Into<String>, element_id: Option<&str>) -> Self {
        Self {
            message: message.into(),
            element_id: element_id.map(str::to_string),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element_id {
            Some(element_id) => write!(f, "{} (element '{}')", self.message, element_id),
            None => f.write_str(&self.message),
        }
    }
}
