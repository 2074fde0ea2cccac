//! Desired-state document
//!
//! A JSON file listing the resources to manage:
//!
//! ```json
//! {
//!   "resources": [
//!     {
//!       "type": "alert-handler",
//!       "key": "smtp",
//!       "attributes": { "type": "smtp", "enabled": true, "...": "..." }
//!     },
//!     { "type": "local-db-index", "key": "userRoot/cn", "ensure": "absent" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::identity::ResourceIdentity;
use crate::normalize::{RemoteObject, normalize_plan};
use crate::registry::SchemaRegistry;
use crate::value::AttributeMap;

/// Whether a resource should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// One entry of the document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredResource {
    /// Resource type name, e.g. `alert-handler`
    #[serde(rename = "type")]
    pub resource_type: String,

    /// External key; empty for singletons
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub ensure: Ensure,

    /// Desired field values, in wire form
    #[serde(default)]
    pub attributes: RemoteObject,
}

/// A whole desired-state document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesiredDocument {
    pub resources: Vec<DesiredResource>,
}

/// A document entry resolved against the schema registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub identity: ResourceIdentity,
    pub ensure: Ensure,
    /// Normalized plan; empty when `ensure` is `Absent`
    pub plan: AttributeMap,
}

impl DesiredDocument {
    /// Load a document from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Resolve every entry: parse keys and normalize plans
    ///
    /// Fails on the first invalid entry, before anything touches the server.
    pub fn resolve(&self, schemas: &SchemaRegistry) -> Result<Vec<ResolvedResource>> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.resources.len());

        for resource in &self.resources {
            let schema = schemas.schema(&resource.resource_type)?;
            let identity =
                ResourceIdentity::parse(&resource.resource_type, schema.key_arity(), &resource.key)?;

            if !seen.insert(identity.clone()) {
                return Err(Error::config(format!(
                    "{} is listed more than once",
                    identity
                )));
            }

            if resource.ensure == Ensure::Absent && schema.class().adopt_only() {
                return Err(Error::invariant(
                    &identity,
                    "singleton and default objects cannot be absent",
                ));
            }

            let plan = match resource.ensure {
                Ensure::Present => normalize_plan(&resource.attributes, &schema)?,
                Ensure::Absent => AttributeMap::new(),
            };

            resolved.push(ResolvedResource {
                identity,
                ensure: resource.ensure,
                plan,
            });
        }

        Ok(resolved)
    }
}
