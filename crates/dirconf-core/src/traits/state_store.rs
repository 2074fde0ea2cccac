// # State Store Trait
//
// Persists the observed state of every tracked resource between runs.
//
// ## Purpose
//
// The tracked observed map is the reconciler's `prior`: it holds the last
// values the client applied to sensitive fields (the server only ever
// returns a mask) and is the baseline for drift detection.
//
// ## Implementations
//
// - Memory: `MemoryStateStore`
// - File-based: `FileStateStore` (JSON, atomic writes)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ResourceIdentity;
use crate::value::AttributeMap;

/// Tracked state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Which object
    pub identity: ResourceIdentity,
    /// Observed state after the last successful reconciliation
    pub observed: AttributeMap,
    /// When it was recorded
    pub last_reconciled: DateTime<Utc>,
}

impl StateRecord {
    /// Create a record stamped with the current time
    pub fn new(identity: ResourceIdentity, observed: AttributeMap) -> Self {
        Self {
            identity,
            observed,
            last_reconciled: Utc::now(),
        }
    }
}

/// Trait for state store implementations
///
/// One record per `ResourceIdentity`; `list_records` returns each tracked
/// identity once.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Cache state in memory (with explicit flush)
///
/// ## Forbidden Capabilities
/// - ❌ Call the configuration API (owned by `ConfigClient`)
/// - ❌ Decide what to change (owned by `Reconciler`)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the full record for an identity
    async fn get_record(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<Option<StateRecord>, crate::Error>;

    /// Get only the observed map for an identity
    async fn get_observed(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<Option<AttributeMap>, crate::Error> {
        Ok(self.get_record(identity).await?.map(|r| r.observed))
    }

    /// Record a freshly observed map, stamped now
    async fn set_observed(
        &self,
        identity: &ResourceIdentity,
        observed: &AttributeMap,
    ) -> Result<(), crate::Error> {
        self.set_record(&StateRecord::new(identity.clone(), observed.clone()))
            .await
    }

    /// Create or replace a record
    async fn set_record(&self, record: &StateRecord) -> Result<(), crate::Error>;

    /// Delete a record
    ///
    /// - `Ok(())`: Deleted, or there was nothing to delete
    async fn delete_record(&self, identity: &ResourceIdentity) -> Result<(), crate::Error>;

    /// List all tracked identities
    async fn list_records(&self) -> Result<Vec<ResourceIdentity>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
