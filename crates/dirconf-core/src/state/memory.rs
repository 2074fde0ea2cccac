// # Memory State Store
//
// Nothing survives a restart: the next run has no prior observed state, so
// sensitive fields are re-applied once and drift cannot be reported until
// the first reconciliation has recorded a baseline.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::identity::ResourceIdentity;
use crate::traits::state_store::{StateRecord, StateStore};

/// Tracked state held in process memory
///
/// Clones share the same records.
///
/// # Example
///
/// ```rust,no_run
/// use dirconf_core::state::MemoryStateStore;
/// use dirconf_core::traits::StateStore;
/// use dirconf_core::{AttributeMap, ResourceIdentity};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     let id = ResourceIdentity::singleton("root-dn");
///
///     store.set_observed(&id, &AttributeMap::new()).await?;
///     assert!(store.get_observed(&id).await?.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    records: Arc<RwLock<BTreeMap<ResourceIdentity, StateRecord>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked resources
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_record(&self, identity: &ResourceIdentity) -> Result<Option<StateRecord>, Error> {
        Ok(self.records.read().await.get(identity).cloned())
    }

    async fn set_record(&self, record: &StateRecord) -> Result<(), Error> {
        self.records
            .write()
            .await
            .insert(record.identity.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, identity: &ResourceIdentity) -> Result<(), Error> {
        self.records.write().await.remove(identity);
        Ok(())
    }

    /// Identities in sorted order
    async fn list_records(&self) -> Result<Vec<ResourceIdentity>, Error> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
