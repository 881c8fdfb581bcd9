//! File-backed store for hosts without a keychain

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{DEFAULT_SERVICE_NAME, SecureStore, StorageError};

const CREDENTIALS_FILE: &str = "credentials.json";

/// [`SecureStore`] that keeps every key in one JSON object on disk.
///
/// Writes go to a sibling temp file that is then renamed over the original,
/// so a reader never observes a half-written file. On Unix the file is
/// created with mode `0600`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl FileStore {
    /// Create a store under the platform config directory
    /// (e.g. `~/.config/<service>/credentials.json` on Linux)
    #[must_use]
    pub fn new(service: &str) -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(service);
        Self::with_path(config_dir.join(CREDENTIALS_FILE))
    }

    /// Create a store at a custom path
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Get the storage path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    // Write paths start from an empty map when the file cannot be parsed, so
    // a damaged file is replaced instead of blocking sign-out and sign-in.
    // The flag reports whether the on-disk contents were discarded.
    async fn read_for_update(&self) -> Result<(BTreeMap<String, String>, bool), StorageError> {
        match self.read_all().await {
            Ok(entries) => Ok((entries, false)),
            Err(StorageError::Json(e)) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Credentials file is corrupt, discarding its contents"
                );
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if entries.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");

        // A stale temp file may carry looser permissions; the mode below only
        // applies to newly created files.
        match tokio::fs::remove_file(&tmp_path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SecureStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let (mut entries, _) = self.read_for_update().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let (mut entries, discarded) = self.read_for_update().await?;
        if entries.remove(key).is_none() && !discarded {
            return Ok(());
        }
        self.write_all(&entries).await
    }
}
