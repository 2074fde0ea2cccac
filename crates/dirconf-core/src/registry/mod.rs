//! Schema and client registry
//!
//! The registry maps resource type names to schema tables, and client type
//! names to the factories that build [`ConfigClient`]s. Nothing is hardcoded
//! in the reconciler: resource types and transports are looked up here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dirconf_core::registry::SchemaRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SchemaRegistry::with_builtin_catalog());
//! dirconf_client_rest::register(&registry);
//!
//! let schema = registry.schema("alert-handler")?;
//! let client = registry.create_client(&config.client)?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::schema::ResourceSchema;
use crate::traits::{ConfigClient, ConfigClientFactory};

/// Registry of resource schemas and client factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct SchemaRegistry {
    /// Resource type name -> schema table
    schemas: RwLock<HashMap<String, Arc<ResourceSchema>>>,

    /// Client type name -> factory
    clients: RwLock<HashMap<String, Box<dyn ConfigClientFactory>>>,
}

impl SchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in resource catalog
    pub fn with_builtin_catalog() -> Self {
        let registry = Self::new();
        for schema in crate::catalog::builtin() {
            registry.register_schema(schema);
        }
        registry
    }

    /// Register a schema under its own name, replacing any previous one
    pub fn register_schema(&self, schema: ResourceSchema) {
        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        schemas.insert(schema.name().to_string(), Arc::new(schema));
    }

    /// Look up the schema of a resource type
    ///
    /// # Returns
    ///
    /// - `Ok(schema)`: The registered schema
    /// - `Err(Error::Config)`: No such resource type
    pub fn schema(&self, resource_type: &str) -> Result<Arc<ResourceSchema>> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        schemas
            .get(resource_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown resource type: {}", resource_type)))
    }

    /// Check if a resource type is registered
    pub fn has_schema(&self, resource_type: &str) -> bool {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        schemas.contains_key(resource_type)
    }

    /// List all registered resource types, sorted
    pub fn list_schemas(&self) -> Vec<String> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// Register a client factory
    ///
    /// # Parameters
    ///
    /// - `name`: Client type name (e.g., "rest")
    /// - `factory`: Factory object for creating client instances
    pub fn register_client(&self, name: impl Into<String>, factory: Box<dyn ConfigClientFactory>) {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients.insert(name.into(), factory);
    }

    /// Create a client from configuration
    ///
    /// The factory receives a handle to this registry so the client can
    /// resolve endpoints for any registered resource type.
    pub fn create_client(self: &Arc<Self>, config: &ClientConfig) -> Result<Box<dyn ConfigClient>> {
        let client_type = config.type_name();
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);

        let factory = clients
            .get(client_type)
            .ok_or_else(|| Error::config(format!("Unknown client type: {}", client_type)))?;

        factory.create(config, Arc::clone(self))
    }

    /// Check if a client type is registered
    pub fn has_client(&self, name: &str) -> bool {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients.contains_key(name)
    }

    /// List all registered client types
    pub fn list_clients(&self) -> Vec<String> {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients.keys().cloned().collect()
    }
}
