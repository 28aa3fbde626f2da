//! Error channels used across the engine.
//!
//! Model problems that still allow parsing to continue are not errors; they are
//! accumulated as [`Problem`](manifold_types::Problem) values. Everything in
//! this module aborts the operation that produced it.

use manifold_types::Problem;
use thiserror::Error;

use crate::runtime::ExecutionId;

/// Raised when an expression source cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("expression '{expression}' opens '${{' without a closing '}}'")]
    Unterminated { expression: String },

    #[error("invalid expression '{expression}' at offset {offset}: {message}")]
    Syntax {
        expression: String,
        offset: usize,
        message: String,
    },
}

/// Raised when a compiled expression cannot be evaluated against a scope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("cannot {operation} a value of type {found}")]
    TypeMismatch { operation: &'static str, found: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("expression '{expression}' does not evaluate to a boolean (got {found})")]
    NotBoolean { expression: String, found: String },
}

/// Hard failures while turning a model into a process definition.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to compile expression on element '{element_id}': {source}")]
    Expression {
        element_id: String,
        #[source]
        source: ExpressionError,
    },
}

/// Failures surfaced by [`ProcessEngine::deploy`](crate::ProcessEngine::deploy).
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("process '{process_id}' has {} problem(s): {}", problems.len(), join_problems(problems))]
    InvalidModel { process_id: String, problems: Vec<Problem> },
}

fn join_problems(problems: &[Problem]) -> String {
    problems.iter().map(Problem::to_string).collect::<Vec<_>>().join("; ")
}

/// Runtime failures raised while driving process instances.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to evaluate {purpose} for activity '{activity_id}': {source}")]
    Evaluation {
        activity_id: String,
        purpose: &'static str,
        #[source]
        source: EvaluationError,
    },

    #[error("invalid loop cardinality for activity '{activity_id}': {value}")]
    InvalidCardinality { activity_id: String, value: String },

    #[error("collection variable '{variable}' for activity '{activity_id}' is not set")]
    CollectionNotFound { activity_id: String, variable: String },

    #[error("collection for activity '{activity_id}' must be a list, got {found}")]
    NotACollection { activity_id: String, found: &'static str },

    #[error("loop cardinality {cardinality} exceeds collection size {size} for activity '{activity_id}'")]
    CardinalityExceedsCollection {
        activity_id: String,
        cardinality: usize,
        size: usize,
    },

    #[error("activity '{activity_id}' requested {requested} instances, above the limit of {limit}")]
    TooManyInstances {
        activity_id: String,
        requested: usize,
        limit: usize,
    },

    #[error("no handler named '{handler}' is registered (activity '{activity_id}')")]
    UnknownHandler { activity_id: String, handler: String },

    #[error("handler '{handler}' failed in activity '{activity_id}': {message}")]
    Handler {
        activity_id: String,
        handler: String,
        message: String,
    },

    #[error("execution {0} does not exist")]
    ExecutionNotFound(ExecutionId),

    #[error("execution {0} is not waiting for a signal")]
    NotWaiting(ExecutionId),

    #[error("task {0} does not exist")]
    TaskNotFound(u64),

    #[error("process definition '{0}' is not deployed")]
    DefinitionNotFound(String),

    #[error("activity '{activity_id}' is not part of process definition '{definition_id}'")]
    ActivityNotFound { definition_id: String, activity_id: String },
}

impl ExecutionError {
    pub(crate) fn evaluation(activity_id: &str, purpose: &'static str, source: EvaluationError) -> Self {
        Self::Evaluation {
            activity_id: activity_id.to_string(),
            purpose,
            source,
        }
    }
}
