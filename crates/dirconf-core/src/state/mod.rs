// # State Store Implementations
//
// Implementations of the StateStore trait. Only the orchestration side
// (the driver, or an embedding application) uses these; the reconciler is
// stateless between calls.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use crate::config::StateStoreConfig;
use crate::error::Result;
use crate::traits::StateStore;

/// Open the state store described by `config`
pub async fn open(config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
    config.validate()?;
    match config {
        StateStoreConfig::Memory => Ok(Box::new(MemoryStateStore::new())),
        StateStoreConfig::File { path } => Ok(Box::new(FileStateStore::new(path).await?)),
    }
}
