//! Platform keychain store
//!
//! One keychain entry per key, under service `<service_name>` and account
//! `<key>`. Keychain calls block, so they run on the blocking thread pool.

use async_trait::async_trait;
use keyring::Entry;
use tracing::instrument;

use super::{DEFAULT_SERVICE_NAME, SecureStore, StorageError};

/// [`SecureStore`] backed by the operating system's credential store.
///
/// - **macOS**: Keychain Services
/// - **Linux**: Secret Service (requires `gnome-keyring` or `kwallet`)
/// - **Windows**: Credential Manager
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl KeyringStore {
    /// Create a keychain store namespaced by `service`
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// The keychain service name
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Check whether a keychain backend answers at all.
    ///
    /// A missing entry still counts as available; only access and platform
    /// failures do not.
    #[must_use]
    pub fn is_available(&self) -> bool {
        match Entry::new(&self.service, "availability-check") {
            Ok(entry) => !matches!(
                entry.get_password(),
                Err(keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_))
            ),
            Err(_) => false,
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service, key).map_err(map_keyring_error)
    }
}

fn map_keyring_error(err: keyring::Error) -> StorageError {
    match err {
        keyring::Error::NoStorageAccess(e) => StorageError::unavailable(e.to_string()),
        keyring::Error::PlatformFailure(e) => StorageError::unavailable(e.to_string()),
        other => StorageError::Keychain(other.to_string()),
    }
}

async fn run_blocking<T, F>(op: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StorageError::Keychain(format!("keychain task failed: {e}")))?
}

#[async_trait]
impl SecureStore for KeyringStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entry = self.entry(key)?;
        run_blocking(move || match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        })
        .await
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let entry = self.entry(key)?;
        let value = value.to_string();
        run_blocking(move || entry.set_password(&value).map_err(map_keyring_error)).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let entry = self.entry(key)?;
        run_blocking(move || match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        assert_eq!(KeyringStore::default().service(), DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn test_access_errors_map_to_unavailable() {
        let err = map_keyring_error(keyring::Error::NoStorageAccess(Box::new(
            std::io::Error::other("locked"),
        )));
        assert!(matches!(err, StorageError::Unavailable(_)));

        let err = map_keyring_error(keyring::Error::TooLong("key".to_string(), 255));
        assert!(matches!(err, StorageError::Keychain(_)));
    }
}
