// # Configuration Client Trait
//
// Defines the interface to the remote configuration API.
//
// ## Implementations
//
// - REST: `dirconf-client-rest` crate
// - Tests: in-memory client under `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use dirconf_core::{ConfigClient, ResourceIdentity};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let client = /* ConfigClient implementation */;
//
//     let id = ResourceIdentity::new("alert-handler", ["smtp"]);
//     if let Some(raw) = client.fetch_object(&id).await? {
//         println!("{}", serde_json::Value::Object(raw));
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::identity::ResourceIdentity;
use crate::normalize::RemoteObject;
use crate::patch::PatchOperation;
use crate::registry::SchemaRegistry;

/// Trait for configuration API clients
///
/// A client moves raw objects over the wire and nothing else. It is
/// stateless between calls.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Call the configuration API for the identity it was given
/// - ✅ Translate wire envelopes into plain field objects
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Retry or re-order operations (a rejected batch goes back to the caller)
/// - ❌ Decide whether a change is needed (owned by `Reconciler`)
/// - ❌ Touch the state store (owned by the caller of `Reconciler`)
/// - ❌ Spawn tasks or threads
///
/// An object that does not exist is `Ok(None)` from `fetch_object`, never an
/// error. `delete_object` on a missing object may either succeed or return an
/// error for which [`crate::Error::is_not_found`] holds.
#[async_trait]
pub trait ConfigClient: Send + Sync {
    /// Read one object
    ///
    /// # Returns
    ///
    /// - `Ok(Some(object))`: The object's fields, envelope stripped
    /// - `Ok(None)`: The object does not exist
    /// - `Err(Error)`: Transport, authentication or server error
    async fn fetch_object(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<Option<RemoteObject>, crate::Error>;

    /// Create one object seeded with `seed`
    ///
    /// The server may fill in defaults; callers re-read rather than trusting
    /// the echo.
    async fn create_object(
        &self,
        identity: &ResourceIdentity,
        seed: &RemoteObject,
    ) -> Result<RemoteObject, crate::Error>;

    /// Submit one batch of operations
    ///
    /// The batch is atomic on the server: either every operation applies or
    /// none does.
    async fn apply_patch(
        &self,
        identity: &ResourceIdentity,
        operations: &[PatchOperation],
    ) -> Result<RemoteObject, crate::Error>;

    /// Delete one object
    async fn delete_object(&self, identity: &ResourceIdentity) -> Result<(), crate::Error>;

    /// Client name, for logging
    fn client_name(&self) -> &'static str;
}

/// Helper trait for constructing clients from configuration
pub trait ConfigClientFactory: Send + Sync {
    /// Create a client
    ///
    /// The schema registry is handed over so clients can map identities to
    /// endpoints and resource families.
    fn create(
        &self,
        config: &crate::config::ClientConfig,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Box<dyn ConfigClient>, crate::Error>;
}
