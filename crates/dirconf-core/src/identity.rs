//! Resource identity
//!
//! An identity names the schema (resource type) and the path segments that
//! locate one object, e.g. `local-db-index[userRoot/uid]`. Identities are
//! immutable: changing any key component is a different object.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Separator used in composite external keys
pub const KEY_SEPARATOR: char = '/';

/// Identity of one remote configuration object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    resource_type: String,
    key: Vec<String>,
}

impl ResourceIdentity {
    /// Create an identity from a resource type and key segments
    pub fn new<I, S>(resource_type: impl Into<String>, key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_type: resource_type.into(),
            key: key.into_iter().map(Into::into).collect(),
        }
    }

    /// Identity of a singleton, which has no key segments
    pub fn singleton(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            key: Vec::new(),
        }
    }

    /// Parse a composite external key such as `"userRoot/uid"`
    ///
    /// The key must have exactly `key_arity` non-empty segments. A singleton
    /// (arity 0) only accepts the empty key. Nothing is guessed or trimmed.
    pub fn parse(resource_type: &str, key_arity: usize, external_key: &str) -> Result<Self> {
        if key_arity == 0 {
            if !external_key.is_empty() {
                return Err(Error::import_key(
                    resource_type,
                    external_key,
                    "singleton resources take an empty key",
                ));
            }
            return Ok(Self::singleton(resource_type));
        }

        let segments: Vec<&str> = external_key.split(KEY_SEPARATOR).collect();
        if segments.len() != key_arity {
            return Err(Error::import_key(
                resource_type,
                external_key,
                format!(
                    "expected {} segment(s) separated by '{}', got {}",
                    key_arity,
                    KEY_SEPARATOR,
                    segments.len()
                ),
            ));
        }

        if let Some(pos) = segments.iter().position(|s| s.is_empty()) {
            return Err(Error::import_key(
                resource_type,
                external_key,
                format!("segment {} is empty", pos + 1),
            ));
        }

        Ok(Self::new(resource_type, segments))
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn key(&self) -> &[String] {
        &self.key
    }

    /// Last key segment: the object's own name within its parent
    pub fn local_id(&self) -> Option<&str> {
        self.key.last().map(String::as_str)
    }

    /// The key rendered back into its external form
    pub fn external_key(&self) -> String {
        self.key.join(&KEY_SEPARATOR.to_string())
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.resource_type, self.external_key())
    }
}
