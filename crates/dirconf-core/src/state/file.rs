// # File State Store
//
// Tracked state persisted as one JSON document.
//
// ## Durability
//
// - Every mutation is written through: serialize into a `.tmp` sibling,
//   copy the current file to the `.backup` sibling, rename the temp file
//   over the original
// - A state file that fails to parse is replaced by its backup on open
// - A failed write leaves the store dirty; `flush` retries it
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "alert-handler[smtp]": {
//       "identity": { "resource_type": "alert-handler", "key": ["smtp"] },
//       "observed": { "enabled": { "kind": "bool", "value": true } },
//       "last_reconciled": "2026-01-09T12:00:00Z"
//     }
//   }
// }
// ```
//
// Observed maps hold the last applied values of sensitive fields, so on
// Unix the file is created readable by its owner only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::identity::ResourceIdentity;
use crate::traits::state_store::{StateRecord, StateStore};

const FORMAT_VERSION: &str = "1.0";

/// Records keyed by the identity's display form
type Records = BTreeMap<String, StateRecord>;

#[derive(Serialize, Deserialize)]
struct Document {
    version: String,
    records: Records,
}

/// Outcome of parsing one file
enum Parsed {
    Ok(Records),
    Corrupt(String),
}

#[derive(Debug)]
struct Inner {
    records: Records,
    /// Memory is ahead of disk
    dirty: bool,
}

/// Tracked state persisted to a JSON file
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::state_store(format!("Failed to {} {}: {}", action, path.display(), e))
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension)
}

impl FileStateStore {
    /// Open the store at `path`, creating parent directories as needed
    ///
    /// A corrupt file is recovered from its `.backup` sibling; if that is missing
    /// or corrupt too, the store starts empty and the next write replaces
    /// both.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create state directory", parent, e))?;
        }

        let records = Self::open_records(&path).await?;
        tracing::debug!(
            "Opened state file {} ({} record(s))",
            path.display(),
            records.len()
        );

        Ok(Self {
            path,
            inner: RwLock::new(Inner {
                records,
                dirty: false,
            }),
        })
    }

    async fn open_records(path: &Path) -> Result<Records, Error> {
        let reason = match Self::parse_file(path).await? {
            Parsed::Ok(records) => return Ok(records),
            Parsed::Corrupt(reason) => reason,
        };
        tracing::warn!("State file is corrupt ({}), trying the backup", reason);

        let backup = sibling(path, "backup");
        match Self::parse_file(&backup).await? {
            Parsed::Ok(records) if backup.exists() => {
                if let Err(e) = fs::copy(&backup, path).await {
                    tracing::error!("Could not restore {} from backup: {}", path.display(), e);
                }
                tracing::info!("Recovered {} record(s) from backup", records.len());
                Ok(records)
            }
            Parsed::Ok(_) => {
                tracing::warn!("No backup available, starting with empty state");
                Ok(Records::new())
            }
            Parsed::Corrupt(reason) => {
                tracing::error!("Backup is corrupt too ({}), starting with empty state", reason);
                Ok(Records::new())
            }
        }
    }

    /// Parse one file; a missing file is an empty record set
    async fn parse_file(path: &Path) -> Result<Parsed, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Parsed::Ok(Records::new()));
            }
            Err(e) => return Err(io_error("read state file", path, e)),
        };

        let document: Document = match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => return Ok(Parsed::Corrupt(format!("{}: {}", path.display(), e))),
        };
        if document.version != FORMAT_VERSION {
            tracing::warn!(
                "State file {} has format {}, expected {}",
                path.display(),
                document.version,
                FORMAT_VERSION
            );
        }
        Ok(Parsed::Ok(document.records))
    }

    /// Write `inner` to disk; the caller holds the write lock
    async fn persist(&self, inner: &mut Inner) -> Result<(), Error> {
        let document = Document {
            version: FORMAT_VERSION.to_string(),
            records: inner.records.clone(),
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        let temp = sibling(&self.path, "tmp");
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| io_error("create", &temp, e))?;
        restrict_permissions(&temp).await;
        file.write_all(&json)
            .await
            .map_err(|e| io_error("write", &temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("sync", &temp, e))?;
        drop(file);

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let backup = sibling(&self.path, "backup");
            if let Err(e) = fs::copy(&self.path, &backup).await {
                tracing::warn!("Could not refresh backup {}: {}", backup.display(), e);
            }
        }

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error("replace state file with", &temp, e))?;

        inner.dirty = false;
        tracing::trace!("Wrote {} record(s) to {}", inner.records.len(), self.path.display());
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await {
        tracing::warn!("Could not restrict permissions of {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_record(&self, identity: &ResourceIdentity) -> Result<Option<StateRecord>, Error> {
        Ok(self.inner.read().await.records.get(&identity.to_string()).cloned())
    }

    async fn set_record(&self, record: &StateRecord) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        inner
            .records
            .insert(record.identity.to_string(), record.clone());
        inner.dirty = true;
        self.persist(&mut inner).await
    }

    async fn delete_record(&self, identity: &ResourceIdentity) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        if inner.records.remove(&identity.to_string()).is_none() {
            return Ok(());
        }
        inner.dirty = true;
        self.persist(&mut inner).await
    }

    async fn list_records(&self) -> Result<Vec<ResourceIdentity>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .records
            .values()
            .map(|r| r.identity.clone())
            .collect())
    }

    /// Retry a write that failed earlier
    async fn flush(&self) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        if inner.dirty {
            self.persist(&mut inner).await
        } else {
            Ok(())
        }
    }
}
