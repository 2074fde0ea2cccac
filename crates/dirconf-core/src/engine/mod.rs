//! Reconciler
//!
//! The Reconciler is responsible for:
//! - Reading remote objects and normalizing them
//! - Planning patch batches with the diff engine
//! - Creating, adopting, updating and deleting objects via the ConfigClient
//! - Re-reading after every change to capture server-side effects
//!
//! ## Architecture
//!
//! ```text
//!   plan (desired) ──┐        ┌── prior observed (tracked by caller)
//!                    ▼        ▼
//!               ┌──────────────────┐
//!               │    Reconciler    │
//!               └──────────────────┘
//!                 │       │      │
//!        ┌────────┘       │      └────────┐
//!        ▼                ▼               ▼
//! ┌─────────────┐  ┌──────────────┐  ┌─────────────┐
//! │ diff engine │  │ ConfigClient │  │   Events    │
//! │   (pure)    │  │  (network)   │  │  (notify)   │
//! └─────────────┘  └──────────────┘  └─────────────┘
//! ```
//!
//! ## Lifecycle of one resource
//!
//! `Absent → Planned → Applying → Observed → (Planned | Absent)`
//!
//! Singletons and non-deletable default objects never see a create or
//! delete call: "create" means adopting the existing object.
//!
//! The reconciler keeps nothing between calls. Whatever must survive (the
//! last observed map) is returned to the caller.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::diff::{self, diff, immutable_changes};
use crate::error::{Error, Result};
use crate::identity::ResourceIdentity;
use crate::normalize::{denormalize, normalize};
use crate::patch::{PatchKind, PatchOperation};
use crate::registry::SchemaRegistry;
use crate::schema::ResourceSchema;
use crate::traits::ConfigClient;
use crate::value::{AttributeMap, AttributeValue};

/// Events emitted by the Reconciler
///
/// Operation values of sensitive fields are redacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// A non-empty batch was planned
    Planned {
        identity: ResourceIdentity,
        operations: Vec<PatchOperation>,
    },

    /// A batch is being submitted
    Applying {
        identity: ResourceIdentity,
        operations: Vec<PatchOperation>,
    },

    /// The object was read
    Observed { identity: ResourceIdentity },

    /// The object does not exist
    Absent { identity: ResourceIdentity },

    /// The object was created
    Created { identity: ResourceIdentity },

    /// A singleton or default object was adopted
    Adopted { identity: ResourceIdentity },

    /// The object was deleted (or was already gone)
    Deleted { identity: ResourceIdentity },

    /// The collaborator rejected a batch
    ApplyFailed {
        identity: ResourceIdentity,
        error: String,
    },
}

/// Result of a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The object exists; its normalized state
    Observed(AttributeMap),
    /// The object no longer exists; drop it from tracked state
    Absent,
}

/// Generic reconciler for every resource type in the registry
pub struct Reconciler {
    /// Client for the configuration API
    client: Box<dyn ConfigClient>,

    /// Schema tables
    schemas: Arc<SchemaRegistry>,

    /// Plan and report, never mutate
    dry_run: bool,

    /// Caller's cancellation signal, checked before every network call
    cancel: Option<CancellationToken>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields
    /// reconcile events
    pub fn new(
        client: Box<dyn ConfigClient>,
        schemas: Arc<SchemaRegistry>,
        config: ReconcilerConfig,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let reconciler = Self {
            client,
            schemas,
            dry_run: config.dry_run,
            cancel: None,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Abort before the next network call once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Schema of an identity's resource type, checking the key shape
    pub fn schema(&self, identity: &ResourceIdentity) -> Result<Arc<ResourceSchema>> {
        let schema = self.schemas.schema(identity.resource_type())?;
        if identity.key().len() != schema.key_arity() {
            return Err(Error::invariant(
                identity,
                format!(
                    "expected {} key segment(s), got {}",
                    schema.key_arity(),
                    identity.key().len()
                ),
            ));
        }
        Ok(schema)
    }

    /// Operations that would converge `observed` to `desired`
    ///
    /// Pure: no network call. Without an observed state the result is every
    /// value the plan expresses.
    pub fn plan(
        &self,
        identity: &ResourceIdentity,
        desired: &AttributeMap,
        observed: Option<&AttributeMap>,
    ) -> Result<Vec<PatchOperation>> {
        let schema = self.schema(identity)?;
        diff::plan(&schema, desired, observed).map_err(|e| e.for_identity(identity))
    }

    /// Converge one object to `desired`
    ///
    /// `prior` is the observed map the caller tracked from the last run; it
    /// supplies the values of sensitive fields the server will not echo.
    ///
    /// # Returns
    ///
    /// The new observed state. On error, nothing the caller holds has
    /// changed; the next call re-plans from fresh state.
    pub async fn reconcile(
        &self,
        identity: &ResourceIdentity,
        desired: &AttributeMap,
        prior: Option<&AttributeMap>,
    ) -> Result<AttributeMap> {
        let schema = self.schema(identity)?;
        schema
            .validate_map(desired)
            .map_err(|e| e.for_identity(identity))?;

        if schema.class().adopt_only() {
            return self.adopt(identity, desired, prior).await;
        }

        match self.read(identity).await? {
            ReadOutcome::Absent => self.create(identity, desired).await,
            ReadOutcome::Observed(observed) => {
                let observed = match prior {
                    Some(prior) => carry_sensitive(&schema, observed, prior),
                    None => observed,
                };
                self.update(identity, desired, &observed).await
            }
        }
    }

    /// Read one object
    ///
    /// A missing singleton or default object is an `InvariantViolation`:
    /// those always exist.
    pub async fn read(&self, identity: &ResourceIdentity) -> Result<ReadOutcome> {
        let schema = self.schema(identity)?;
        self.ensure_active(identity)?;

        let raw = match self.client.fetch_object(identity).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(Error::collaborator(identity, e.to_string())),
        };

        match raw {
            Some(raw) => {
                let observed =
                    normalize(&raw, &schema).map_err(|e| e.for_identity(identity))?;
                debug!("Read {} ({} field(s))", identity, observed.len());
                self.emit_event(ReconcileEvent::Observed {
                    identity: identity.clone(),
                });
                Ok(ReadOutcome::Observed(observed))
            }
            None if schema.class().adopt_only() => Err(Error::invariant(
                identity,
                "singleton or default object does not exist on the server",
            )),
            None => {
                debug!("{} does not exist", identity);
                self.emit_event(ReconcileEvent::Absent {
                    identity: identity.clone(),
                });
                Ok(ReadOutcome::Absent)
            }
        }
    }

    /// Create an object from a plan
    ///
    /// Adopt-only resource types are adopted instead. Otherwise the object
    /// is created seeded with the plan's expressed values, re-read to pick
    /// up server defaults, and converged with a follow-up update if the
    /// server changed anything.
    pub async fn create(
        &self,
        identity: &ResourceIdentity,
        plan: &AttributeMap,
    ) -> Result<AttributeMap> {
        let schema = self.schema(identity)?;
        schema
            .validate_map(plan)
            .map_err(|e| e.for_identity(identity))?;

        if schema.class().adopt_only() {
            debug!("{} is adopt-only, adopting instead of creating", identity);
            return self.adopt(identity, plan, None).await;
        }

        let seed = denormalize(plan, &schema).map_err(|e| e.for_identity(identity))?;
        if self.dry_run {
            let operations =
                diff::plan(&schema, plan, None).map_err(|e| e.for_identity(identity))?;
            info!(
                "Dry run: would create {} with {} field(s)",
                identity,
                seed.len()
            );
            self.emit_event(ReconcileEvent::Planned {
                identity: identity.clone(),
                operations: redact_sensitive(&schema, &operations),
            });
            // Nothing exists yet, so there is nothing observed
            return Ok(AttributeMap::new());
        }

        self.ensure_active(identity)?;
        info!(
            "Creating {} via {} ({} field(s))",
            identity,
            self.client.client_name(),
            seed.len()
        );
        self.client
            .create_object(identity, &seed)
            .await
            .map_err(|e| Error::collaborator(identity, e.to_string()))?;
        self.emit_event(ReconcileEvent::Created {
            identity: identity.clone(),
        });

        let observed = match self.read(identity).await? {
            ReadOutcome::Observed(observed) => carry_sensitive(&schema, observed, plan),
            ReadOutcome::Absent => {
                return Err(Error::NotFound {
                    identity: identity.clone(),
                });
            }
        };

        self.update(identity, plan, &observed).await
    }

    /// Converge an object that must already exist
    ///
    /// Used for singletons and default objects in place of create.
    pub async fn adopt(
        &self,
        identity: &ResourceIdentity,
        plan: &AttributeMap,
        prior: Option<&AttributeMap>,
    ) -> Result<AttributeMap> {
        let schema = self.schema(identity)?;

        let observed = match self.read(identity).await? {
            ReadOutcome::Observed(observed) => observed,
            ReadOutcome::Absent => {
                return Err(Error::NotFound {
                    identity: identity.clone(),
                });
            }
        };
        let observed = match prior {
            Some(prior) => carry_sensitive(&schema, observed, prior),
            None => observed,
        };

        let converged = self.update(identity, plan, &observed).await?;
        info!("Adopted {}", identity);
        self.emit_event(ReconcileEvent::Adopted {
            identity: identity.clone(),
        });
        Ok(converged)
    }

    /// Converge an object from a known observed state
    ///
    /// An empty diff is a no-op: no network call, `prior_observed` returned
    /// as is.
    pub async fn update(
        &self,
        identity: &ResourceIdentity,
        plan: &AttributeMap,
        prior_observed: &AttributeMap,
    ) -> Result<AttributeMap> {
        let schema = self.schema(identity)?;
        let operations =
            diff(&schema, plan, prior_observed).map_err(|e| e.for_identity(identity))?;

        if operations.is_empty() {
            debug!("{} is up to date", identity);
            return Ok(prior_observed.clone());
        }

        let immutable = immutable_changes(&schema, &operations);
        if !immutable.is_empty() {
            warn!(
                "{} cannot be patched in place, immutable field(s): {}",
                identity,
                immutable.join(", ")
            );
            return Err(Error::RequiresReplacement {
                identity: identity.clone(),
                fields: immutable,
            });
        }

        debug!("Planned {} operation(s) for {}", operations.len(), identity);
        self.emit_event(ReconcileEvent::Planned {
            identity: identity.clone(),
            operations: redact_sensitive(&schema, &operations),
        });

        if self.dry_run {
            info!(
                "Dry run: would apply {} operation(s) to {}",
                operations.len(),
                identity
            );
            return Ok(prior_observed.clone());
        }

        self.apply(identity, &schema, &operations).await?;

        match self.read(identity).await? {
            ReadOutcome::Observed(observed) => Ok(carry_sensitive(&schema, observed, plan)),
            ReadOutcome::Absent => Err(Error::NotFound {
                identity: identity.clone(),
            }),
        }
    }

    /// Delete an object
    ///
    /// An object that is already gone counts as deleted.
    pub async fn delete(&self, identity: &ResourceIdentity) -> Result<()> {
        let schema = self.schema(identity)?;
        if schema.class().adopt_only() {
            return Err(Error::invariant(
                identity,
                "singleton and default objects cannot be deleted",
            ));
        }

        if self.dry_run {
            info!("Dry run: would delete {}", identity);
            return Ok(());
        }

        self.ensure_active(identity)?;
        match self.client.delete_object(identity).await {
            Ok(()) => info!("Deleted {}", identity),
            Err(e) if e.is_not_found() => debug!("{} already gone", identity),
            Err(e) => return Err(Error::collaborator(identity, e.to_string())),
        }

        self.emit_event(ReconcileEvent::Deleted {
            identity: identity.clone(),
        });
        Ok(())
    }

    /// Submit one batch, exactly once
    async fn apply(
        &self,
        identity: &ResourceIdentity,
        schema: &ResourceSchema,
        operations: &[PatchOperation],
    ) -> Result<()> {
        self.ensure_active(identity)?;

        info!(
            "Applying {} operation(s) to {} via {}",
            operations.len(),
            identity,
            self.client.client_name()
        );
        self.emit_event(ReconcileEvent::Applying {
            identity: identity.clone(),
            operations: redact_sensitive(schema, operations),
        });

        match self.client.apply_patch(identity, operations).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                error!("Apply failed for {}: {}", identity, message);
                self.emit_event(ReconcileEvent::ApplyFailed {
                    identity: identity.clone(),
                    error: message.clone(),
                });
                Err(Error::ApplyFailed {
                    identity: identity.clone(),
                    operations: redact_sensitive(schema, operations),
                    message,
                })
            }
        }
    }

    fn ensure_active(&self, identity: &ResourceIdentity) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => {
                warn!("Reconciliation of {} cancelled", identity);
                Err(Error::Cancelled {
                    identity: identity.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Emit a reconcile event
    pub(crate) fn emit_event(&self, event: ReconcileEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            ),
            Err(TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, event discarded")
            }
        }
    }
}

/// Fill masked sensitive fields of `observed` from `source`
///
/// The server echoes sensitive fields as a mask, which normalizes to
/// `Null`. The last value the client applied lives in the plan or the
/// caller's tracked state.
pub fn carry_sensitive(
    schema: &ResourceSchema,
    observed: AttributeMap,
    source: &AttributeMap,
) -> AttributeMap {
    let Ok(active) = schema.fields_for(&observed) else {
        return observed;
    };

    let mut result = observed;
    for field in active.into_iter().filter(|f| f.sensitive) {
        if result.get(field.name).is_some_and(AttributeValue::is_known) {
            continue;
        }
        if let Some(value) = source.get(field.name).filter(|v| v.is_known()) {
            result = result.with(field.name, value.clone());
        }
    }
    result
}

/// Copy of `operations` with sensitive values masked, for events and logs
pub fn redact_sensitive(
    schema: &ResourceSchema,
    operations: &[PatchOperation],
) -> Vec<PatchOperation> {
    operations
        .iter()
        .map(|op| {
            let sensitive = schema.field(&op.field).is_some_and(|f| f.sensitive);
            if sensitive && op.kind == PatchKind::Replace && op.value.is_known() {
                PatchOperation::replace(op.field.clone(), AttributeValue::from("<redacted>"))
            } else {
                op.clone()
            }
        })
        .collect()
}
