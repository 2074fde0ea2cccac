// # dirconf-core
//
// Generic reconciliation engine for a directory server's REST
// configuration API.
//
// ## Architecture Overview
//
// - **AttributeValue / AttributeMap**: Typed snapshot of one configuration object
// - **ResourceSchema**: Declarative field table per resource type
// - **normalize**: Raw JSON <-> AttributeMap, same rules both ways
// - **diff**: Minimal, ordered patch batch from observed state to plan
// - **Reconciler**: Create / adopt / read / update / delete / import
// - **ConfigClient**: Trait for the configuration API transport
// - **StateStore**: Trait for tracked observed state (orchestration side)
// - **SchemaRegistry**: Resource types and client factories by name
//
// ## Design Principles
//
// 1. **One engine, many schemas**: resource types are data, not code
// 2. **Pure core**: normalization and diffing never touch the network
// 3. **Stateless reconciler**: the caller owns tracked state
// 4. **No blind retry**: a rejected batch goes back to the caller

pub mod catalog;
pub mod config;
pub mod diff;
pub mod document;
pub mod engine;
pub mod error;
pub mod identity;
pub mod import;
pub mod normalize;
pub mod patch;
pub mod registry;
pub mod schema;
pub mod state;
pub mod traits;
pub mod value;

// Re-export core types for convenience
pub use config::{ClientConfig, DirconfConfig, ReconcilerConfig, RunMode, StateStoreConfig};
pub use document::{DesiredDocument, DesiredResource, Ensure, ResolvedResource};
pub use engine::{ReadOutcome, ReconcileEvent, Reconciler};
pub use error::{Error, Result};
pub use identity::ResourceIdentity;
pub use import::{DriftReport, DriftStatus, TrackedResource};
pub use normalize::RemoteObject;
pub use patch::{PatchKind, PatchOperation};
pub use registry::SchemaRegistry;
pub use schema::{FieldKind, FieldSchema, ResourceClass, ResourceSchema, VariantSchema};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{ConfigClient, ConfigClientFactory, StateRecord, StateStore};
pub use value::{AttributeMap, AttributeValue};
