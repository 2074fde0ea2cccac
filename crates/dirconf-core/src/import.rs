//! Import and drift detection
//!
//! Import brings an existing remote object under management: the external
//! key is parsed strictly, the object is read, and a tracked resource is
//! seeded whose plan equals its observed state, so the first diff is empty.
//!
//! Drift detection re-reads a tracked object and reports what changed out
//! of band. Neither operation ever writes to the server.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diff::diff;
use crate::engine::{ReadOutcome, Reconciler, carry_sensitive};
use crate::error::{Error, Result};
use crate::identity::ResourceIdentity;
use crate::patch::PatchOperation;
use crate::value::AttributeMap;

/// A freshly imported resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedResource {
    pub identity: ResourceIdentity,
    /// Initialized equal to `observed`
    pub plan: AttributeMap,
    pub observed: AttributeMap,
}

/// Outcome of a drift check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "operations", rename_all = "snake_case")]
pub enum DriftStatus {
    /// The remote object matches the tracked state
    InSync,
    /// The operations that would restore the tracked state
    Drifted(Vec<PatchOperation>),
    /// The remote object no longer exists
    Gone,
}

/// Drift report for one tracked resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub identity: ResourceIdentity,
    pub status: DriftStatus,
}

impl DriftReport {
    pub fn is_in_sync(&self) -> bool {
        self.status == DriftStatus::InSync
    }
}

impl Reconciler {
    /// Import an object by its external key, e.g. `"userRoot/uid"`
    ///
    /// The key is validated before any network call. A missing object is
    /// `NotFound`, never a silently empty resource.
    pub async fn import(&self, resource_type: &str, external_key: &str) -> Result<TrackedResource> {
        let schema = self.schemas().schema(resource_type)?;
        let identity = ResourceIdentity::parse(resource_type, schema.key_arity(), external_key)?;

        let observed = match self.read(&identity).await? {
            ReadOutcome::Observed(observed) => observed,
            ReadOutcome::Absent => {
                warn!("Cannot import {}: object does not exist", identity);
                return Err(Error::NotFound { identity });
            }
        };

        info!("Imported {} ({} field(s))", identity, observed.len());
        Ok(TrackedResource {
            identity,
            plan: observed.clone(),
            observed,
        })
    }

    /// Compare a tracked object's remote state against `prior`
    pub async fn detect_drift(
        &self,
        identity: &ResourceIdentity,
        prior: &AttributeMap,
    ) -> Result<DriftReport> {
        let schema = self.schema(identity)?;

        let status = match self.read(identity).await? {
            ReadOutcome::Absent => DriftStatus::Gone,
            ReadOutcome::Observed(fresh) => {
                let fresh = carry_sensitive(&schema, fresh, prior);
                let operations =
                    diff(&schema, prior, &fresh).map_err(|e| e.for_identity(identity))?;
                if operations.is_empty() {
                    DriftStatus::InSync
                } else {
                    DriftStatus::Drifted(operations)
                }
            }
        };

        match &status {
            DriftStatus::InSync => debug!("{} is in sync", identity),
            DriftStatus::Drifted(ops) => {
                info!("{} drifted, {} operation(s) to restore", identity, ops.len())
            }
            DriftStatus::Gone => info!("{} no longer exists", identity),
        }

        Ok(DriftReport {
            identity: identity.clone(),
            status,
        })
    }
}
