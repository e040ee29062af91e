//! File-backed persistence for backend catalogs.
//!
//! One JSON file per backend under the cache root, named from the sanitized
//! backend name plus a short hash of the raw name. Records are advisory: a missing or unreadable file is a
//! cache miss, and a root that cannot be created disables the store for the
//! rest of the run.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::types::PersistedCacheRecord;
use crate::error::{McpError, McpResult};

#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: Option<PathBuf>,
}

/// Map every character outside `[A-Za-z0-9_-]` to `_`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// File stem for `name`: readable, and distinct for names that sanitize alike.
pub fn file_stem(name: &str) -> String {
    let hash = blake3::hash(name.as_bytes()).to_hex();
    format!("{}-{}", sanitize_name(name), &hash.as_str()[..12])
}

impl DiskCacheStore {
    /// Open a store rooted at `root`, creating it if needed. `None` or a
    /// root that cannot be created yields a disabled store.
    pub async fn open(root: Option<PathBuf>) -> Self {
        let Some(root) = root else {
            info!("Catalog cache disabled, catalogs are kept in memory only");
            return Self::disabled();
        };

        match tokio::fs::create_dir_all(&root).await {
            Ok(()) => {
                info!("Catalog cache at {}", root.display());
                Self { root: Some(root) }
            }
            Err(e) => {
                warn!(
                    "Cannot create catalog cache dir {}: {} - continuing without persistence",
                    root.display(),
                    e
                );
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { root: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}.json", file_stem(name))))
    }

    /// Read the record for `name`. Missing or malformed files are a miss.
    pub async fn load(&self, name: &str) -> Option<PersistedCacheRecord> {
        let path = self.path_for(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read catalog cache {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring malformed catalog cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Overwrite the record for `name`. No-op when disabled.
    pub async fn store(&self, name: &str, record: &PersistedCacheRecord) -> McpResult<()> {
        let Some(path) = self.path_for(name) else {
            return Ok(());
        };
        let encoded = serde_json::to_vec_pretty(record)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &encoded)
            .await
            .map_err(|e| McpError::Cache(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| McpError::Cache(format!("replace {}: {}", path.display(), e)))?;

        debug!(
            "Persisted {} catalog entries for '{}'",
            record.entries.len(),
            name
        );
        Ok(())
    }

    /// Delete the record for `name`. Already-absent is fine.
    pub async fn invalidate(&self, name: &str) -> McpResult<()> {
        let Some(path) = self.path_for(name) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed catalog cache {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
