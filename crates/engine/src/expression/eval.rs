//! Evaluation of parsed expression trees against a variable scope.

use serde_json::{Number, Value};

use crate::error::EvaluationError;

use super::VariableScope;
use super::syntax::{BinaryOperator, Node, Segment, Template, UnaryOperator};

pub(crate) fn evaluate_template(template: &Template, scope: &dyn VariableScope) -> Result<Value, EvaluationError> {
    match template {
        Template::Literal(text) => Ok(Value::String(text.clone())),
        Template::Single(node) => evaluate(node, scope),
        Template::Composite(segments) => {
            let mut output = String::new();
            for segment in segments {
                match segment {
                    Segment::Text(text) => output.push_str(text),
                    Segment::Eval(node) => output.push_str(&format_json_value(&evaluate(node, scope)?)),
                }
            }
            Ok(Value::String(output))
        }
    }
}

pub(crate) fn evaluate(node: &Node, scope: &dyn VariableScope) -> Result<Value, EvaluationError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::List(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Node::Identifier(name) => scope
            .variable(name)
            .ok_or_else(|| EvaluationError::UnknownVariable(name.clone())),
        Node::Member(target, property) => match evaluate(target, scope)? {
            Value::Object(map) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
            other => Err(EvaluationError::TypeMismatch {
                operation: "read a property of",
                found: type_name(&other),
            }),
        },
        Node::Index(target, index) => {
            let target = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            index_value(&target, &index)
        }
        Node::Size(target) => match evaluate(target, scope)? {
            Value::Array(items) => Ok(Value::from(items.len())),
            Value::Object(map) => Ok(Value::from(map.len())),
            Value::String(text) => Ok(Value::from(text.chars().count())),
            other => Err(EvaluationError::TypeMismatch {
                operation: "take the size of",
                found: type_name(&other),
            }),
        },
        Node::Unary(operator, operand) => {
            let value = evaluate(operand, scope)?;
            match operator {
                UnaryOperator::Not => Ok(Value::Bool(!coerce_bool(&value)?)),
                UnaryOperator::Empty => Ok(Value::Bool(is_empty(&value))),
                UnaryOperator::Negate => match coerce_number(&value)? {
                    Numeric::Integer(integer) => integer.checked_neg().map(Value::from).ok_or(EvaluationError::Overflow),
                    Numeric::Float(float) => float_value(-float),
                },
            }
        }
        Node::Binary(BinaryOperator::And, left, right) => {
            if !coerce_bool(&evaluate(left, scope)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(coerce_bool(&evaluate(right, scope)?)?))
        }
        Node::Binary(BinaryOperator::Or, left, right) => {
            if coerce_bool(&evaluate(left, scope)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(coerce_bool(&evaluate(right, scope)?)?))
        }
        Node::Binary(operator, left, right) => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            apply_binary(*operator, &left, &right)
        }
    }
}

fn apply_binary(operator: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvaluationError> {
    match operator {
        BinaryOperator::Equal => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::NotEqual => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOperator::Less => compare(left, right).map(|ordering| Value::Bool(ordering.is_lt())),
        BinaryOperator::LessOrEqual => compare(left, right).map(|ordering| Value::Bool(ordering.is_le())),
        BinaryOperator::Greater => compare(left, right).map(|ordering| Value::Bool(ordering.is_gt())),
        BinaryOperator::GreaterOrEqual => compare(left, right).map(|ordering| Value::Bool(ordering.is_ge())),
        BinaryOperator::Add if is_text(left) || is_text(right) => {
            Ok(Value::String(format!("{}{}", format_json_value(left), format_json_value(right))))
        }
        BinaryOperator::Divide => {
            let divisor = coerce_number(right)?.as_f64();
            if divisor == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            float_value(coerce_number(left)?.as_f64() / divisor)
        }
        BinaryOperator::Add | BinaryOperator::Subtract | BinaryOperator::Multiply | BinaryOperator::Remainder => {
            arithmetic(operator, coerce_number(left)?, coerce_number(right)?)
        }
        BinaryOperator::And | BinaryOperator::Or => unreachable!("logical operators short-circuit in evaluate"),
    }
}

fn arithmetic(operator: BinaryOperator, left: Numeric, right: Numeric) -> Result<Value, EvaluationError> {
    if let (Numeric::Integer(left), Numeric::Integer(right)) = (left, right) {
        let result = match operator {
            BinaryOperator::Add => left.checked_add(right),
            BinaryOperator::Subtract => left.checked_sub(right),
            BinaryOperator::Multiply => left.checked_mul(right),
            _ => {
                if right == 0 {
                    return Err(EvaluationError::DivisionByZero);
                }
                left.checked_rem(right)
            }
        };
        return result.map(Value::from).ok_or(EvaluationError::Overflow);
    }

    let (left, right) = (left.as_f64(), right.as_f64());
    let result = match operator {
        BinaryOperator::Add => left + right,
        BinaryOperator::Subtract => left - right,
        BinaryOperator::Multiply => left * right,
        _ => {
            if right == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            left % right
        }
    };
    float_value(result)
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Integer(i64),
    Float(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Self::Integer(integer) => integer as f64,
            Self::Float(float) => float,
        }
    }
}

fn numeric_of(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(Numeric::Integer)
            .or_else(|| number.as_f64().map(Numeric::Float)),
        Value::String(text) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .map(Numeric::Integer)
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(Numeric::Float))
        }
        Value::Null => Some(Numeric::Integer(0)),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Result<Numeric, EvaluationError> {
    numeric_of(value).ok_or(EvaluationError::TypeMismatch {
        operation: "use as a number",
        found: type_name(value),
    })
}

fn float_value(float: f64) -> Result<Value, EvaluationError> {
    Number::from_f64(float).map(Value::Number).ok_or(EvaluationError::Overflow)
}

/// Strings that do not read as numbers turn `+` into concatenation.
fn is_text(value: &Value) -> bool {
    matches!(value, Value::String(text) if text.trim().parse::<f64>().is_err())
}

pub(crate) fn coerce_bool(value: &Value) -> Result<bool, EvaluationError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Null => Ok(false),
        Value::String(text) if text.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(text) if text.eq_ignore_ascii_case("false") || text.is_empty() => Ok(false),
        other => Err(EvaluationError::TypeMismatch {
            operation: "use as a boolean",
            found: type_name(other),
        }),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(flag), Value::String(text)) | (Value::String(text), Value::Bool(flag)) => {
            text.eq_ignore_ascii_case(if *flag { "true" } else { "false" })
        }
        (Value::Number(_), _) | (_, Value::Number(_)) => match (numeric_of(left), numeric_of(right)) {
            (Some(left), Some(right)) => left.as_f64() == right.as_f64(),
            _ => false,
        },
        _ => false,
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, EvaluationError> {
    if let (Value::String(left), Value::String(right)) = (left, right)
        && (left.trim().parse::<f64>().is_err() || right.trim().parse::<f64>().is_err())
    {
        return Ok(left.cmp(right));
    }
    let left = coerce_number(left)?.as_f64();
    let right = coerce_number(right)?.as_f64();
    left.partial_cmp(&right).ok_or(EvaluationError::TypeMismatch {
        operation: "compare",
        found: "number",
    })
}

fn index_value(target: &Value, index: &Value) -> Result<Value, EvaluationError> {
    match target {
        Value::Array(items) => {
            let Numeric::Integer(position) = coerce_number(index)? else {
                return Err(EvaluationError::TypeMismatch {
                    operation: "index a list with",
                    found: "decimal number",
                });
            };
            Ok(usize::try_from(position)
                .ok()
                .and_then(|position| items.get(position))
                .cloned()
                .unwrap_or(Value::Null))
        }
        Value::Object(map) => Ok(map.get(&format_json_value(index)).cloned().unwrap_or(Value::Null)),
        other => Err(EvaluationError::TypeMismatch {
            operation: "index into",
            found: type_name(other),
        }),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Render a JSON value the way it appears inside composite text.
///
/// - Strings are returned as-is
/// - Null renders as the empty string
/// - Objects and arrays use their compact JSON form
pub(crate) fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(string_value) => string_value.clone(),
        Value::Number(number_value) => number_value.to_string(),
        Value::Bool(boolean_value) => boolean_value.to_string(),
        Value::Null => String::new(),
        other_value => other_value.to_string(),
    }
}
