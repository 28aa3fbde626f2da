//! # Manifold Engine
//!
//! Executes process models whose activities may run as multi-instance loops:
//! one modeled activity instantiated once per collection element or a computed
//! number of times, either one after another or all at once, with an optional
//! early completion condition.
//!
//! ## Usage
//!
//! ```rust
//! use manifold_engine::{ProcessEngine, parse_process_str};
//!
//! let model = parse_process_str(r#"
//! id: review
//! nodes:
//!   - id: approve
//!     type: user_task
//!     multi_instance:
//!       collection: reviewers
//!       element_variable: reviewer
//! "#)?;
//!
//! let mut engine = ProcessEngine::default();
//! let definition_id = engine.deploy(&model)?;
//! let mut variables = indexmap::IndexMap::new();
//! variables.insert("reviewers".to_string(), serde_json::json!(["kermit", "gonzo"]));
//! let instance = engine.start_process_instance(&definition_id, variables)?;
//!
//! let assignees: Vec<_> = engine.tasks().into_iter().filter_map(|task| task.assignee).collect();
//! assert_eq!(assignees, vec!["kermit", "gonzo"]);
//! for task in engine.tasks() {
//!     engine.complete_task(task.id, Default::default())?;
//! }
//! assert!(engine.is_ended(instance));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`expression`**: `${ ... }` expression compiler and evaluator
//! - **`parser`**: model to definition translation, including the multi-instance builder
//! - **`behavior`**: activity behaviors and the multi-instance strategies
//! - **`runtime`**: execution tree, agenda and the [`ProcessEngine`] facade
//! - **`config`**: engine settings loaded from disk

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod behavior;
pub mod config;
pub mod error;
pub mod expression;
pub mod parser;
pub mod runtime;

pub use behavior::{ActivityBehavior, ActivityBehaviorFactory, DefaultActivityBehaviorFactory, NoopHandler, TaskHandler};
pub use config::{ConfigError, EngineConfig};
pub use error::{DeployError, EvaluationError, ExecutionError, ExpressionError, ParseError};
pub use expression::{Expression, ExpressionManager, VariableScope};
pub use parser::{ActivityDefinition, Diagnostics, ParsedProcess, ProcessDefinition, ProcessParser, TaskDefinition};
pub use runtime::{Execution, ExecutionContext, ExecutionId, HistoryEvent, HistoryEventKind, ProcessEngine, Task, TaskId};

pub use manifold_types::{FlowNode, FlowNodeKind, LoopCharacteristics, MultiInstanceMode, Problem, ProcessModel};

/// Loads a process model from the filesystem.
///
/// Files ending in `.json` are read as JSON; everything else as YAML.
pub fn parse_process_file(file_path: impl AsRef<Path>) -> Result<ProcessModel> {
    let file_path = file_path.as_ref();
    let content =
        fs::read_to_string(file_path).with_context(|| format!("Failed to read process file: {}", file_path.display()))?;

    let is_json = file_path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    if is_json {
        return serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON process: {}", file_path.display()));
    }
    parse_process_str(&content).with_context(|| format!("Failed to parse process file: {}", file_path.display()))
}

/// Parses a YAML (or JSON) process document.
pub fn parse_process_str(content: &str) -> Result<ProcessModel> {
    serde_yaml::from_str(content).context("Failed to parse process document")
}
