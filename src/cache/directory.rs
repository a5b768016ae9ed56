//! On-disk cache store: one JSON file per key.
//!
//! Entries survive restarts and can be shared by processes on the same
//! machine. Writes go to a temporary file that is renamed into place, so a
//! reader sees either the old entry, the new one, or none, never half a file.
//! Nothing is ever expired; delete the directory to reset.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use super::store::CacheStore;
use crate::{MimirError, Result};

/// [`CacheStore`] backed by a directory of `<key>.json` files.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Use `root` as the cache directory. It is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location: `$XDG_CACHE_HOME/mimir/responses` (or platform equivalent).
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("mimir")
            .join("responses")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(MimirError::Store(format!(
                "key {key:?} is not a valid file name"
            )));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl CacheStore for DirectoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.entry_path(key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MimirError::Store(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.entry_path(key)?;
        fs::create_dir_all(&self.root).await.map_err(|e| {
            MimirError::Store(format!("failed to create {}: {e}", self.root.display()))
        })?;

        let tmp = self
            .root
            .join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec(&value)?;
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| MimirError::Store(format!("failed to write {}: {e}", tmp.display())))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(MimirError::Store(format!(
                "failed to move entry into {}: {e}",
                path.display()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "directory"
    }
}
