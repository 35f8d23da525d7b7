//! jq expression evaluation over JSON values.
//!
//! Backs the `jq` template helper and the JSON mapping step. Expressions
//! are compiled per call against the jq core and standard library.

use indexmap::IndexMap;
use jaq_interpret::{Ctx, FilterT, ParseCtx, RcIter, Val};
use serde_json::Value;
use thiserror::Error;

/// Error raised by jq expression evaluation.
#[derive(Debug, Error)]
pub enum JqError {
    /// The expression failed to parse.
    #[error("invalid jq expression '{expr}': {message}")]
    Parse { expr: String, message: String },

    /// The expression references undefined names.
    #[error("jq expression '{expr}' failed to compile")]
    Compile { expr: String },

    /// Evaluation failed at runtime.
    #[error("jq evaluation failed: {message}")]
    Eval { message: String },
}

/// Run a jq expression over a JSON value, returning every produced output.
pub fn query(expr: &str, input: &Value) -> Result<Vec<Value>, JqError> {
    let mut defs = ParseCtx::new(Vec::new());
    defs.insert_natives(jaq_core::core());
    defs.insert_defs(jaq_std::std());

    let (main, parse_errors) = jaq_parse::parse(expr, jaq_parse::main());
    if !parse_errors.is_empty() {
        let message = parse_errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(JqError::Parse {
            expr: expr.to_string(),
            message,
        });
    }
    let Some(main) = main else {
        return Err(JqError::Parse {
            expr: expr.to_string(),
            message: "empty expression".to_string(),
        });
    };

    let filter = defs.compile(main);
    if !defs.errs.is_empty() {
        return Err(JqError::Compile {
            expr: expr.to_string(),
        });
    }

    let inputs = RcIter::new(core::iter::empty());
    let mut outputs = Vec::new();
    for output in filter.run((Ctx::new([], &inputs), Val::from(input.clone()))) {
        let val = output.map_err(|e| JqError::Eval {
            message: e.to_string(),
        })?;
        outputs.push(Value::from(val));
    }
    Ok(outputs)
}

/// Run a jq expression and collapse the output sequence to a single value.
///
/// Zero outputs become an empty array (the residue of a non-matching
/// `select`), a single output is returned as-is, and multiple outputs are
/// wrapped in an array.
pub fn query_one(expr: &str, input: &Value) -> Result<Value, JqError> {
    let mut outputs = query(expr, input)?;
    Ok(match outputs.len() {
        0 => Value::Array(Vec::new()),
        1 => outputs.remove(0),
        _ => Value::Array(outputs),
    })
}

/// Apply a set of named jq mappings to a JSON value, producing one output
/// value per mapping key in declared order.
pub fn query_map(
    mappings: &IndexMap<String, String>,
    input: &Value,
) -> Result<IndexMap<String, Value>, JqError> {
    let mut row = IndexMap::with_capacity(mappings.len());
    for (key, expr) in mappings {
        row.insert(key.clone(), query_one(expr, input)?);
    }
    Ok(row)
}
