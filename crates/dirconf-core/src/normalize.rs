//! Normalization layer
//!
//! Converts raw JSON objects (API responses or desired-state documents) into
//! `AttributeMap`s, and back. The same rules apply in both directions, so a
//! converged object never shows a diff caused by representation alone:
//!
//! - empty string and null are the same value for `empty_is_null` fields
//! - absent or null collections are empty collections
//! - sets are de-duplicated and unordered, lists keep their order
//! - enum values outside the vocabulary are a `SchemaViolation`

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::schema::{DISCRIMINATOR, FieldKind, FieldSchema, ResourceSchema};
use crate::value::{AttributeMap, AttributeValue};

/// A raw configuration object as exchanged with the collaborator
pub type RemoteObject = Map<String, Value>;

/// Which snapshot is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    /// Desired state from the caller
    Plan,
    /// State read back from the server
    Observed,
}

/// Normalize an object read from the server
pub fn normalize(raw: &RemoteObject, schema: &ResourceSchema) -> Result<AttributeMap> {
    normalize_as(raw, schema, Snapshot::Observed)
}

/// Normalize a desired-state object supplied by the caller
///
/// Fields the plan leaves out are `Unknown` when the server computes them
/// and empty otherwise. Setting a read-only field is a `SchemaViolation`.
pub fn normalize_plan(raw: &RemoteObject, schema: &ResourceSchema) -> Result<AttributeMap> {
    normalize_as(raw, schema, Snapshot::Plan)
}

/// Normalize `raw` as the given kind of snapshot
pub fn normalize_as(
    raw: &RemoteObject,
    schema: &ResourceSchema,
    snapshot: Snapshot,
) -> Result<AttributeMap> {
    let variant = match raw.get(DISCRIMINATOR) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => {
            return Err(Error::schema_violation(
                schema.name(),
                DISCRIMINATOR,
                format!("expected a type name, got {}", json_kind(other)),
            ));
        }
    };
    let active = schema.active_fields(variant)?;

    for key in raw.keys() {
        if !active.iter().any(|f| f.name == key) {
            let tagged = match variant {
                Some(v) => AttributeMap::new().with(DISCRIMINATOR, AttributeValue::enumeration(v)),
                None => AttributeMap::new(),
            };
            return Err(schema.undeclared(key, &tagged));
        }
    }

    let mut values = Vec::with_capacity(active.len());
    for field in active {
        let raw_value = raw.get(field.name).filter(|v| !v.is_null());
        let value = normalize_field(schema, field, raw_value, snapshot)?;
        values.push((field.name, value));
    }

    Ok(values.into_iter().collect())
}

fn normalize_field(
    schema: &ResourceSchema,
    field: &FieldSchema,
    raw: Option<&Value>,
    snapshot: Snapshot,
) -> Result<AttributeValue> {
    match snapshot {
        Snapshot::Plan if field.read_only => {
            if raw.is_some() {
                return Err(Error::schema_violation(
                    schema.name(),
                    field.name,
                    "read-only field cannot be set",
                ));
            }
            return Ok(AttributeValue::Unknown);
        }
        // The server only ever echoes a mask; the real value is tracked client-side
        Snapshot::Observed if field.sensitive => return Ok(AttributeValue::Null),
        _ => {}
    }

    let Some(raw) = raw else {
        return absent_value(schema, field, snapshot);
    };

    let value = convert(schema, field, raw)?;
    if value.is_null() {
        return absent_value(schema, field, snapshot);
    }
    field.check(schema.name(), &value)?;
    Ok(value)
}

fn absent_value(
    schema: &ResourceSchema,
    field: &FieldSchema,
    snapshot: Snapshot,
) -> Result<AttributeValue> {
    if field.computed && snapshot == Snapshot::Plan {
        return Ok(AttributeValue::Unknown);
    }
    if field.required && !field.computed {
        return Err(Error::schema_violation(
            schema.name(),
            field.name,
            "required field is missing",
        ));
    }
    Ok(field.kind.empty_value())
}

fn convert(schema: &ResourceSchema, field: &FieldSchema, raw: &Value) -> Result<AttributeValue> {
    let mismatch = || {
        Error::schema_violation(
            schema.name(),
            field.name,
            format!("expected {}, got {}", field.kind.name(), json_kind(raw)),
        )
    };

    match &field.kind {
        FieldKind::Bool => raw.as_bool().map(AttributeValue::Bool).ok_or_else(mismatch),
        FieldKind::Int64 => raw.as_i64().map(AttributeValue::Int64).ok_or_else(mismatch),
        FieldKind::String => {
            let s = raw.as_str().ok_or_else(mismatch)?;
            if s.is_empty() && field.empty_is_null {
                Ok(AttributeValue::Null)
            } else {
                Ok(AttributeValue::String(s.to_string()))
            }
        }
        FieldKind::Enum(_) => {
            let s = raw.as_str().ok_or_else(mismatch)?;
            if s.is_empty() && field.empty_is_null {
                Ok(AttributeValue::Null)
            } else {
                Ok(AttributeValue::Enum(s.to_string()))
            }
        }
        FieldKind::StringList => Ok(AttributeValue::StringList(strings(raw).ok_or_else(mismatch)?)),
        FieldKind::StringSet | FieldKind::EnumSet(_) => Ok(AttributeValue::StringSet(
            strings(raw).ok_or_else(mismatch)?.into_iter().collect(),
        )),
    }
}

fn strings(raw: &Value) -> Option<Vec<String>> {
    raw.as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Encode a single value as JSON
///
/// `Null` and `Unknown` both encode as JSON null; callers decide whether to
/// send them at all.
pub fn value_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null | AttributeValue::Unknown => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Int64(i) => Value::from(*i),
        AttributeValue::String(s) | AttributeValue::Enum(s) => Value::String(s.clone()),
        AttributeValue::StringList(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::StringSet(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
    }
}

/// Build a raw object from a map, e.g. to seed a create call
///
/// Only known, non-empty values of writable fields are emitted. An omitted
/// field and an empty one normalize to the same value, so nothing is lost.
pub fn denormalize(map: &AttributeMap, schema: &ResourceSchema) -> Result<RemoteObject> {
    schema.validate_map(map)?;

    let mut raw = RemoteObject::new();
    for field in schema.fields_for(map)? {
        if field.read_only {
            continue;
        }
        let Some(value) = map.get(field.name) else {
            continue;
        };
        if !value.is_known() || value.is_empty_collection() {
            continue;
        }
        raw.insert(field.name.to_string(), value_to_json(value));
    }
    Ok(raw)
}
