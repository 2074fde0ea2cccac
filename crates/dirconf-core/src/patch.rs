//! Patch operations
//!
//! One operation is one atomic field-level change. Scalars are only ever
//! replaced; set and list elements are added or removed one at a time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::AttributeValue;

/// Kind of a patch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    /// Replace the whole field value
    Replace,
    /// Add one element to a collection
    Add,
    /// Remove one element from a collection
    Remove,
}

impl PatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchKind::Replace => "replace",
            PatchKind::Add => "add",
            PatchKind::Remove => "remove",
        }
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A field-level change submitted as part of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    /// Field the operation targets
    pub field: String,
    /// What to do
    pub kind: PatchKind,
    /// New value for `Replace`, the element for `Add`/`Remove`
    pub value: AttributeValue,
}

impl PatchOperation {
    /// Replace a field's whole value
    pub fn replace(field: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            field: field.into(),
            kind: PatchKind::Replace,
            value: value.into(),
        }
    }

    /// Add one element to a collection field
    pub fn add(field: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: PatchKind::Add,
            value: AttributeValue::String(element.into()),
        }
    }

    /// Remove one element from a collection field
    pub fn remove(field: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: PatchKind::Remove,
            value: AttributeValue::String(element.into()),
        }
    }

    /// The element of an `Add`/`Remove` operation
    pub fn element(&self) -> Option<&str> {
        match self.kind {
            PatchKind::Add | PatchKind::Remove => self.value.as_str(),
            PatchKind::Replace => None,
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.field, self.value)
    }
}
