//! Computed fields
//!
//! Expressions use evalexpr syntax. Only the variables an expression actually
//! references are bound, taken from the record's current field values.

use evalexpr::{ContextWithMutableVariables, HashMapContext, Value as EvalValue};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::sslog::SslogRecord;
use crate::error::{MelsrvError, Result};
use crate::protocols::melsec::{FieldMap, FieldValue, Value};

/// A field derived from other fields of the same record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedField {
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub units: Option<String>,
}

/// Evaluate every computed field in order, adding results to the record
///
/// A failing expression is skipped with a warning; later expressions still
/// run and may reference earlier results.
pub fn compute(record: &mut SslogRecord, computed: &[ComputedField]) {
    for field in computed {
        match evaluate(&field.expression, &record.fieldvalues) {
            Ok(value) => {
                record.fieldvalues.insert(
                    field.name.clone(),
                    FieldValue {
                        value,
                        units: field.units.clone(),
                    },
                );
            },
            Err(e) => warn!(
                "{}: skipping computed field '{}': {}",
                record.source, field.name, e
            ),
        }
    }
}

/// Evaluate one expression against a field map
pub fn evaluate(expression: &str, fields: &FieldMap) -> Result<Value> {
    let tree = evalexpr::build_operator_tree(expression).map_err(|e| {
        MelsrvError::expression(format!("Invalid expression '{}': {}", expression, e))
    })?;

    let mut context = HashMapContext::new();
    for name in tree.iter_variable_identifiers() {
        let field = fields.get(name).ok_or_else(|| {
            MelsrvError::expression(format!(
                "Field '{}' referenced by '{}' is missing",
                name, expression
            ))
        })?;
        context
            .set_value(name.to_string(), to_eval_value(&field.value))
            .map_err(|e| {
                MelsrvError::expression(format!("Failed to set variable {}: {}", name, e))
            })?;
    }

    let result = tree.eval_with_context(&context).map_err(|e| {
        MelsrvError::expression(format!("Failed to evaluate '{}': {}", expression, e))
    })?;
    from_eval_value(result, expression)
}

/// Numbers bind as floats so that division never truncates
fn to_eval_value(value: &Value) -> EvalValue {
    match value.as_f64() {
        Some(f) => EvalValue::Float(f),
        None => EvalValue::String(value.to_string()),
    }
}

fn from_eval_value(value: EvalValue, expression: &str) -> Result<Value> {
    match value {
        EvalValue::Int(i) => Ok(Value::Int(i)),
        EvalValue::Float(f) => Ok(whole_number(f)),
        EvalValue::Boolean(b) => Ok(Value::Int(i64::from(b))),
        EvalValue::String(s) => Ok(Value::Text(s)),
        _ => Err(MelsrvError::expression(format!(
            "Expression '{}' did not produce a scalar",
            expression
        ))),
    }
}

/// Whole results within `i64` range come back as integers
fn whole_number(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}
