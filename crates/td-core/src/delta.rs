//! # Field Deltas
//!
//! A delta is a flat JSON object of `field -> new value`. Merging is
//! shallow: keys present in the delta overwrite, absent keys are left
//! untouched, and a `null` value clears the field.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub type Delta = Map<String, Value>;

#[derive(Error, Debug)]
pub enum DeltaError {
    /// The value did not serialize to a JSON object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("field conversion failed: {0}")]
    Serde(#[from] serde_json::Error),
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Interpret a JSON value as a delta.
pub fn from_value(value: Value) -> Result<Delta, DeltaError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DeltaError::NotAnObject { found: kind(&other) }),
    }
}

/// Serialize a record into its field map.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Delta, DeltaError> {
    from_value(serde_json::to_value(value)?)
}

/// Overwrite `target` with every key of `delta`.
pub fn merge(target: &mut Delta, delta: &Delta) {
    for (key, value) in delta {
        target.insert(key.clone(), value.clone());
    }
}

/// Shallow-merge `delta` into a record and deserialize the result.
pub fn apply_delta<T>(value: &T, delta: &Delta) -> Result<T, DeltaError>
where
    T: Serialize + DeserializeOwned,
{
    let mut fields = to_fields(value)?;
    merge(&mut fields, delta);
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Drop `null` entries. Revision change sets only carry the fields that
/// are actually being revised.
pub fn remove_empty(delta: &Delta) -> Delta {
    delta
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Fields whose value differs between `before` and `after`, with their
/// `after` value. A key missing from `after` is reported as `null`.
pub fn changes(before: &Delta, after: &Delta) -> Delta {
    let mut out = Delta::new();
    for (key, value) in after {
        if before.get(key) != Some(value) {
            out.insert(key.clone(), value.clone());
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            out.insert(key.clone(), Value::Null);
        }
    }
    out
}

/// Sorted names of the fields that differ between two field maps. A key
/// absent on one side and `null` on the other is not a difference.
pub fn divergent_fields(left: &Delta, right: &Delta) -> Vec<String> {
    let mut keys: Vec<&String> = left.keys().chain(right.keys()).collect();
    keys.sort();
    keys.dedup();
    keys.into_iter()
        .filter(|k| {
            let l = left.get(*k).unwrap_or(&Value::Null);
            let r = right.get(*k).unwrap_or(&Value::Null);
            l != r
        })
        .cloned()
        .collect()
}
