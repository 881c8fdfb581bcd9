//! Credential persistence for the authenticated user

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::store::{ACCESS_TOKEN_KEY, SecureStore, StorageError, USER_DATA_KEY};
use crate::utils::redact;

/// User profile returned by the exchange endpoint.
///
/// An open JSON object: known fields have typed accessors, everything else is
/// kept as-is and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserData(Map<String, Value>);

impl UserData {
    /// Create an empty profile
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an arbitrary field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set an arbitrary field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// `user_id` field
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.get_str("user_id")
    }

    /// `email` field
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    /// `team_id` field
    #[must_use]
    pub fn team_id(&self) -> Option<&str> {
        self.get_str("team_id")
    }

    /// Whether no fields are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying JSON object
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for UserData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Stored credentials for the signed-in user
#[derive(Clone, PartialEq)]
pub struct CredentialRecord {
    /// Access token for API calls
    pub access_token: String,
    /// User profile
    pub user_data: UserData,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &redact(&self.access_token))
            .field("user_data", &self.user_data)
            .finish()
    }
}

impl CredentialRecord {
    /// Get the Authorization header value
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Reads and writes the signed-in user's credentials.
///
/// Cheap to clone; clones share the same store. Pass one to every component
/// that needs to know whether the user is signed in.
#[derive(Debug, Clone)]
pub struct TokenManager {
    store: Arc<dyn SecureStore>,
}

impl TokenManager {
    /// Create a token manager over `store`
    #[must_use]
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    /// Persist the access token, then the user profile.
    ///
    /// Any previous profile is deleted before the new token is written, so a
    /// token is never paired with another account's profile. If the profile
    /// write fails the error is returned, but the token already stored is
    /// valid and [`is_authenticated`](Self::is_authenticated) reports true.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if either write fails.
    pub async fn store_tokens(
        &self,
        access_token: &str,
        user_data: &UserData,
    ) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(user_data)?;

        self.store.delete(USER_DATA_KEY).await?;
        self.store.set(ACCESS_TOKEN_KEY, access_token).await?;
        self.store.set(USER_DATA_KEY, &serialized).await?;

        tracing::debug!(
            token = %redact(access_token),
            user_id = ?user_data.user_id(),
            "Credentials stored"
        );
        Ok(())
    }

    /// Load the access token
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the store cannot be read.
    pub async fn get_access_token(&self) -> Result<Option<String>, StorageError> {
        self.store.get(ACCESS_TOKEN_KEY).await
    }

    /// Load the user profile
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the store cannot be read or the stored
    /// profile is not valid JSON.
    pub async fn get_user_data(&self) -> Result<Option<UserData>, StorageError> {
        match self.store.get(USER_DATA_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Load token and profile together.
    ///
    /// A token without a profile (left by an interrupted
    /// [`store_tokens`](Self::store_tokens)) yields an empty profile.
    ///
    /// # Errors
    ///
    /// Same as [`get_user_data`](Self::get_user_data).
    pub async fn credentials(&self) -> Result<Option<CredentialRecord>, StorageError> {
        let Some(access_token) = self.get_access_token().await?.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let user_data = self.get_user_data().await?.unwrap_or_default();
        Ok(Some(CredentialRecord {
            access_token,
            user_data,
        }))
    }

    /// Whether a non-empty access token is stored.
    ///
    /// No expiry check is performed.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the store cannot be read.
    pub async fn is_authenticated(&self) -> Result<bool, StorageError> {
        Ok(self
            .get_access_token()
            .await?
            .is_some_and(|token| !token.is_empty()))
    }

    /// Delete token and profile. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the store rejects a delete.
    pub async fn clear_tokens(&self) -> Result<(), StorageError> {
        self.store.delete(ACCESS_TOKEN_KEY).await?;
        self.store.delete(USER_DATA_KEY).await?;
        tracing::debug!("Credentials cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn manager() -> (TokenManager, MemoryStore) {
        let store = MemoryStore::new();
        (TokenManager::new(Arc::new(store.clone())), store)
    }

    fn sample_user() -> UserData {
        UserData::new()
            .with("user_id", "u1")
            .with("email", "u1@example.com")
            .with("team_id", "t1")
            .with("roles", serde_json::json!(["admin", "billing"]))
    }

    /// Store that refuses writes to the user-data key while `deny` is set
    #[derive(Debug)]
    struct FailingUserDataStore {
        inner: MemoryStore,
        deny: AtomicBool,
    }

    impl FailingUserDataStore {
        fn new(deny: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                deny: AtomicBool::new(deny),
            }
        }
    }

    #[async_trait]
    impl SecureStore for FailingUserDataStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == USER_DATA_KEY && self.deny.load(Ordering::SeqCst) {
                return Err(StorageError::unavailable("write denied"));
            }
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_store_and_get_roundtrip() {
        let (manager, _) = manager();
        manager.store_tokens("tok", &sample_user()).await.unwrap();

        assert_eq!(manager.get_access_token().await.unwrap().as_deref(), Some("tok"));
        assert_eq!(manager.get_user_data().await.unwrap(), Some(sample_user()));

        manager.clear_tokens().await.unwrap();
        assert_eq!(manager.get_access_token().await.unwrap(), None);
        assert_eq!(manager.get_user_data().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_is_authenticated_lifecycle() {
        let (manager, _) = manager();
        assert!(!manager.is_authenticated().await.unwrap());

        manager.store_tokens("tok", &UserData::new()).await.unwrap();
        assert!(manager.is_authenticated().await.unwrap());

        manager.clear_tokens().await.unwrap();
        assert!(!manager.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_token_is_not_authenticated() {
        let (manager, store) = manager();
        store.set(ACCESS_TOKEN_KEY, "").await.unwrap();
        assert!(!manager.is_authenticated().await.unwrap());
        assert!(manager.credentials().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_overwrites_previous_credentials() {
        let (manager, _) = manager();
        manager.store_tokens("old", &sample_user()).await.unwrap();
        manager
            .store_tokens("new", &UserData::new().with("user_id", "u2"))
            .await
            .unwrap();

        let record = manager.credentials().await.unwrap().unwrap();
        assert_eq!(record.access_token, "new");
        assert_eq!(record.user_data.user_id(), Some("u2"));
        assert_eq!(record.user_data.email(), None);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (manager, store) = manager();
        manager.clear_tokens().await.unwrap();
        manager.store_tokens("tok", &sample_user()).await.unwrap();
        manager.clear_tokens().await.unwrap();
        manager.clear_tokens().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_user_data_write_keeps_token() {
        let manager = TokenManager::new(Arc::new(FailingUserDataStore::new(true)));

        let result = manager.store_tokens("tok", &sample_user()).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));

        assert!(manager.is_authenticated().await.unwrap());
        let record = manager.credentials().await.unwrap().unwrap();
        assert_eq!(record.access_token, "tok");
        assert!(record.user_data.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reauth_does_not_keep_previous_profile() {
        let store = Arc::new(FailingUserDataStore::new(false));
        let manager = TokenManager::new(store.clone());

        let alice = UserData::new().with("user_id", "alice");
        manager.store_tokens("tokA", &alice).await.unwrap();

        store.deny.store(true, Ordering::SeqCst);
        let bob = UserData::new().with("user_id", "bob");
        assert!(manager.store_tokens("tokB", &bob).await.is_err());

        let record = manager.credentials().await.unwrap().unwrap();
        assert_eq!(record.access_token, "tokB");
        assert_ne!(record.user_data.user_id(), Some("alice"));
        assert!(record.user_data.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_fields_are_preserved() {
        let (manager, _) = manager();
        manager.store_tokens("tok", &sample_user()).await.unwrap();

        let loaded = manager.get_user_data().await.unwrap().unwrap();
        assert_eq!(loaded.get("roles"), Some(&serde_json::json!(["admin", "billing"])));
    }

    #[test]
    fn test_authorization_header() {
        let record = CredentialRecord {
            access_token: "access123".to_string(),
            user_data: UserData::new(),
        };
        assert_eq!(record.authorization_header(), "Bearer access123");
        assert!(!format!("{record:?}").contains("access123"));
    }
}
