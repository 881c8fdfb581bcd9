//! Secure credential storage
//!
//! Every piece of state this crate persists (the pending CSRF nonce, the
//! access token and the user profile) lives behind the [`SecureStore`] trait
//! under one of three fixed keys. The key names are a storage contract: renaming
//! them orphans credentials written by earlier versions.
//!
//! Backends:
//!
//! - [`KeyringStore`]: platform keychain (macOS Keychain, Windows Credential
//!   Manager, Linux Secret Service)
//! - [`FileStore`]: JSON file in the user config directory with `0600`
//!   permissions, for hosts without a keyring daemon
//! - [`MemoryStore`]: in-process map, used by tests

mod file;
mod keyring;
mod memory;

pub use file::FileStore;
pub use self::keyring::KeyringStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

/// Key holding the serialized pending auth session
pub const PENDING_STATE_KEY: &str = "oauth_state";

/// Key holding the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Key holding the serialized user profile
pub const USER_DATA_KEY: &str = "user_data";

/// Default namespace for all keys
pub const DEFAULT_SERVICE_NAME: &str = "oauth-deeplink";

/// Errors raised by a [`SecureStore`] backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unavailable or access denied
    #[error("Secure storage unavailable: {0}")]
    Unavailable(String),

    /// Platform keychain error
    #[error("Keychain error: {0}")]
    Keychain(String),

    /// I/O error in the file backend
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be (de)serialized
    #[error("Stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Create an unavailable-backend error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Async key-value store for secrets.
///
/// Implementations guarantee consistent single-key reads and writes. A
/// successful `set` means the value is durable: callers rely on this before
/// handing control to the browser.
#[async_trait]
pub trait SecureStore: Send + Sync + std::fmt::Debug {
    /// Read a value; `Ok(None)` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
