//! Diff engine
//!
//! Computes the patch operations that move an observed object to a plan.
//!
//! Rules, per field of the plan's active variant, in declaration order:
//!
//! 1. `Unknown` plan values and read-only fields produce nothing.
//! 2. Scalars: one `Replace` when the values differ (`Null == Null`).
//! 3. Sets: one `Remove` per element only in the state, then one `Add` per
//!    element only in the plan. Elements added out of band between our read
//!    and our write are never clobbered by a whole-set replace.
//! 4. Lists: one `Replace` of the whole list on any difference, order
//!    included.
//! 5. Sensitive fields compare against the state map's value, which the
//!    reconciler fills with the last value the client applied (the server
//!    only returns a mask).

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::patch::{PatchKind, PatchOperation};
use crate::schema::{FieldKind, FieldSchema, ResourceSchema};
use crate::value::{AttributeMap, AttributeValue};

/// Compute the operations that converge `state` to `plan`
pub fn diff(
    schema: &ResourceSchema,
    plan: &AttributeMap,
    state: &AttributeMap,
) -> Result<Vec<PatchOperation>> {
    schema.validate_map(plan)?;
    schema.validate_map(state)?;

    let mut operations = Vec::new();
    for field in schema.fields_for(plan)? {
        let planned = plan.get(field.name).unwrap_or(&AttributeValue::Unknown);
        if planned.is_unknown() || field.read_only {
            continue;
        }
        let current = match state.get(field.name) {
            Some(value) if !value.is_unknown() => value.clone(),
            _ => field.kind.empty_value(),
        };
        diff_field(field, planned, &current, &mut operations);
    }
    Ok(operations)
}

fn diff_field(
    field: &FieldSchema,
    planned: &AttributeValue,
    current: &AttributeValue,
    operations: &mut Vec<PatchOperation>,
) {
    match &field.kind {
        FieldKind::StringSet | FieldKind::EnumSet(_) => {
            let empty = BTreeSet::new();
            let wanted = planned.as_set().unwrap_or(&empty);
            let have = current.as_set().unwrap_or(&empty);
            for element in have.difference(wanted) {
                operations.push(PatchOperation::remove(field.name, element.as_str()));
            }
            for element in wanted.difference(have) {
                operations.push(PatchOperation::add(field.name, element.as_str()));
            }
        }
        FieldKind::StringList => {
            let wanted = planned.as_list().unwrap_or(&[]);
            let have = current.as_list().unwrap_or(&[]);
            if wanted != have {
                operations.push(PatchOperation::replace(
                    field.name,
                    AttributeValue::StringList(wanted.to_vec()),
                ));
            }
        }
        _ => {
            if planned != current {
                operations.push(PatchOperation::replace(field.name, planned.clone()));
            }
        }
    }
}

/// Plan against an optional observed state
///
/// With no observed state the result is what a freshly created object
/// would still need, i.e. every value the plan expresses.
pub fn plan(
    schema: &ResourceSchema,
    desired: &AttributeMap,
    observed: Option<&AttributeMap>,
) -> Result<Vec<PatchOperation>> {
    match observed {
        Some(observed) => diff(schema, desired, observed),
        None => diff(schema, desired, &AttributeMap::new()),
    }
}

/// Immutable fields touched by a batch
pub fn immutable_changes(schema: &ResourceSchema, operations: &[PatchOperation]) -> Vec<String> {
    let mut fields: Vec<String> = operations
        .iter()
        .filter(|op| schema.field(&op.field).is_some_and(|f| f.immutable))
        .map(|op| op.field.clone())
        .collect();
    fields.dedup();
    fields
}

/// Apply a batch to a map, the way the server would
///
/// Pure simulation: useful for test doubles and for checking that a diff
/// converges.
pub fn apply_operations(
    schema: &ResourceSchema,
    state: &AttributeMap,
    operations: &[PatchOperation],
) -> Result<AttributeMap> {
    let mut result = state.clone();
    for op in operations {
        let field = schema.field(&op.field).ok_or_else(|| {
            Error::schema_violation(schema.name(), op.field.as_str(), "field is not declared")
        })?;

        let current = match result.get(field.name) {
            Some(value) if value.is_known() => value.clone(),
            _ => field.kind.empty_value(),
        };

        let next = match (op.kind, current) {
            (PatchKind::Replace, _) => op.value.clone(),
            (kind, AttributeValue::StringSet(mut items)) => {
                let element = element_of(schema, op)?;
                if kind == PatchKind::Add {
                    items.insert(element);
                } else {
                    items.remove(&element);
                }
                AttributeValue::StringSet(items)
            }
            (kind, AttributeValue::StringList(mut items)) => {
                let element = element_of(schema, op)?;
                if kind == PatchKind::Add {
                    items.push(element);
                } else {
                    items.retain(|item| *item != element);
                }
                AttributeValue::StringList(items)
            }
            (kind, _) => {
                return Err(Error::schema_violation(
                    schema.name(),
                    op.field.as_str(),
                    format!("{} is not valid for a scalar field", kind),
                ));
            }
        };
        result = result.with(field.name, next);
    }
    Ok(result)
}

fn element_of(schema: &ResourceSchema, op: &PatchOperation) -> Result<String> {
    op.element().map(str::to_string).ok_or_else(|| {
        Error::schema_violation(
            schema.name(),
            op.field.as_str(),
            format!("{} requires a single string element", op.kind),
        )
    })
}
