//! Error types for the reconciliation engine
//!
//! Every resource-scoped error carries the identity it concerns and, where
//! one or more fields are involved, their names. Schemas with hundreds of
//! fields are otherwise impossible to debug from a log line.

use thiserror::Error;

use crate::identity::ResourceIdentity;
use crate::patch::PatchOperation;

/// Result type alias for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the reconciliation engine
#[derive(Error, Debug)]
pub enum Error {
    /// A value does not match the declared field schema
    ///
    /// Never retried: it means the remote object's schema and ours disagree.
    #[error("Schema violation on {}.{field}: {message}", subject(.resource, .identity.as_ref()))]
    SchemaViolation {
        /// Resource type name
        resource: String,
        /// The object concerned, once known
        identity: Option<ResourceIdentity>,
        /// Offending field
        field: String,
        /// What was wrong with it
        message: String,
    },

    /// Object absent on read
    #[error("Object not found: {identity}")]
    NotFound {
        /// The identity that was looked up
        identity: ResourceIdentity,
    },

    /// A lifecycle invariant was broken (e.g. a singleton does not exist)
    #[error("Invariant violated for {identity}: {message}")]
    InvariantViolation {
        /// The resource concerned
        identity: ResourceIdentity,
        /// Which invariant
        message: String,
    },

    /// The collaborator rejected a patch batch
    ///
    /// The attempted operations are attached so the caller can re-plan from
    /// fresh state. The batch is never resubmitted by the engine.
    #[error("Apply failed for {identity} ({} operation(s), fields: {}): {message}",
        .operations.len(), field_list(.operations))]
    ApplyFailed {
        /// The resource concerned
        identity: ResourceIdentity,
        /// The batch that was rejected
        operations: Vec<PatchOperation>,
        /// Collaborator-supplied reason
        message: String,
    },

    /// Malformed composite key supplied to import
    #[error("Invalid import key '{key}' for {resource}: {message}")]
    ImportKeyInvalid {
        /// Resource type name
        resource: String,
        /// The key as supplied
        key: String,
        /// Why it was rejected
        message: String,
    },

    /// The plan changes fields that cannot be patched in place
    #[error("{identity} requires replacement, immutable field(s) changed: {}", .fields.join(", "))]
    RequiresReplacement {
        /// The resource concerned
        identity: ResourceIdentity,
        /// Immutable fields whose values differ
        fields: Vec<String>,
    },

    /// The caller cancelled the reconciliation before the next network call
    #[error("Reconciliation of {identity} cancelled")]
    Cancelled {
        /// The resource concerned
        identity: ResourceIdentity,
    },

    /// A collaborator call other than apply failed (fetch, create, delete)
    #[error("Collaborator error for {identity}: {message}")]
    Collaborator {
        /// The resource concerned
        identity: ResourceIdentity,
        /// Collaborator-supplied reason
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// HTTP client errors (from the configuration API)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Request rejected by server-side validation
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// Remote object missing (raised by collaborators, before identity context is attached)
    #[error("Remote object missing: {0}")]
    RemoteMissing(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

fn subject(resource: &str, identity: Option<&ResourceIdentity>) -> String {
    match identity {
        Some(identity) => identity.to_string(),
        None => resource.to_string(),
    }
}

fn field_list(operations: &[PatchOperation]) -> String {
    let mut fields: Vec<&str> = operations.iter().map(|op| op.field.as_str()).collect();
    fields.dedup();
    fields.join(", ")
}

impl Error {
    /// Create a schema violation error
    pub fn schema_violation(
        resource: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SchemaViolation {
            resource: resource.into(),
            identity: None,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attach the object a schema violation was found in
    ///
    /// Other errors, and violations already scoped, pass through unchanged.
    pub fn for_identity(self, object: &ResourceIdentity) -> Self {
        match self {
            Self::SchemaViolation {
                resource,
                identity: None,
                field,
                message,
            } => Self::SchemaViolation {
                resource,
                identity: Some(object.clone()),
                field,
                message,
            },
            other => other,
        }
    }

    /// Create an invariant violation error
    pub fn invariant(identity: &ResourceIdentity, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            identity: identity.clone(),
            message: message.into(),
        }
    }

    /// Create an import key error
    pub fn import_key(
        resource: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ImportKeyInvalid {
            resource: resource.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a collaborator error
    pub fn collaborator(identity: &ResourceIdentity, message: impl Into<String>) -> Self {
        Self::Collaborator {
            identity: identity.clone(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a server-side rejection error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a "remote object missing" error
    pub fn remote_missing(msg: impl Into<String>) -> Self {
        Self::RemoteMissing(msg.into())
    }

    /// True for errors a collaborator uses to say the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::RemoteMissing(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
