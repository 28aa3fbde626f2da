//! Compiled `${ ... }` expressions evaluated against execution scopes.
//!
//! Three source shapes are accepted:
//! - plain text without `${`, which evaluates to itself as a string
//! - a single `${expr}` block, which evaluates to the typed JSON value of `expr`
//! - text mixing literals and blocks, which renders to a string
//!
//! The grammar covers boolean logic (`&&`, `||`, `!` and the `and`/`or`/`not`
//! keywords), comparisons, arithmetic, member and index access, list literals,
//! `empty x` and `x.size()`.

mod eval;
mod syntax;

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{EvaluationError, ExpressionError};

pub(crate) use eval::{format_json_value, type_name};

/// Read access to variables visible from an evaluation point.
pub trait VariableScope {
    /// Resolve `name`, or `None` when no visible scope defines it.
    fn variable(&self, name: &str) -> Option<Value>;
}

impl VariableScope for Map<String, Value> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl VariableScope for indexmap::IndexMap<String, Value> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Compiles expression sources once so they can be evaluated many times.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionManager;

impl ExpressionManager {
    pub fn new() -> Self {
        Self
    }

    /// Parse `source` into a reusable [`Expression`].
    pub fn create_expression(&self, source: &str) -> Result<Expression, ExpressionError> {
        let template = syntax::parse_template(source)?;
        Ok(Expression {
            source: source.to_string(),
            template,
        })
    }
}

/// A compiled expression. Cheap to clone and safe to share between executions.
#[derive(Clone, PartialEq)]
pub struct Expression {
    source: String,
    template: syntax::Template,
}

impl Expression {
    /// The text the expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `scope`.
    pub fn get_value(&self, scope: &dyn VariableScope) -> Result<Value, EvaluationError> {
        eval::evaluate_template(&self.template, scope)
    }

    /// Evaluate and require a boolean result.
    ///
    /// Only `true`/`false` (or the strings `"true"`/`"false"`) are accepted.
    pub fn get_boolean(&self, scope: &dyn VariableScope) -> Result<bool, EvaluationError> {
        match self.get_value(scope)? {
            Value::Bool(flag) => Ok(flag),
            Value::String(text) if text == "true" => Ok(true),
            Value::String(text) if text == "false" => Ok(false),
            other => Err(EvaluationError::NotBoolean {
                expression: self.source.clone(),
                found: eval::type_name(&other).to_string(),
            }),
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.source).finish()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
