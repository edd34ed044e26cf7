//! Structural equality for JSON documents.
//!
//! The remote store may hand back a definition with different whitespace or key
//! order than the one that was submitted. Those are not real changes, so
//! documents are compared as trees: object key order is irrelevant, array order
//! matters, and numbers compare by value (`1` equals `1.0`).

use serde_json::{Number, Value};

use crate::error::CoreError;

/// Compare two JSON documents structurally.
///
/// If either side fails to parse, the documents are compared textually; an
/// unparseable document only ever equals itself byte for byte.
#[must_use]
pub fn documents_equal(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<Value>(a),
        serde_json::from_str::<Value>(b),
    ) {
        (Ok(a), Ok(b)) => values_equal(&a, &b),
        _ => a == b,
    }
}

/// Compare two parsed JSON values structurally.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

#[allow(clippy::float_cmp)]
fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x == y;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Parse a document attribute, naming the attribute in the error.
///
/// # Errors
///
/// Returns `CoreError::InvalidDocument` if `text` is not valid JSON.
pub fn parse_document(field: &'static str, text: &str) -> Result<Value, CoreError> {
    serde_json::from_str(text).map_err(|source| CoreError::InvalidDocument { field, source })
}
