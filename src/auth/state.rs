//! CSRF state generation and pending-session tracking
//!
//! A [`PendingAuthSession`] binds the authorization request to the callback
//! that eventually comes back through the deep link. It is written to the
//! secure store before the browser opens and is single-use: [`SessionTracker::consume`]
//! deletes it whatever the validation outcome was.
//!
//! # Concurrency
//!
//! Only one session can be pending. Calling [`SessionTracker::begin`] again
//! before the first callback arrives replaces the stored nonce, and the
//! earlier callback then fails validation. Concurrent authorization attempts
//! are not supported.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::DEFAULT_PENDING_SESSION_TTL;
use crate::store::{PENDING_STATE_KEY, SecureStore, StorageError};
use crate::utils::redact;

/// Random bytes per nonce (256 bits)
const STATE_BYTES: usize = 32;

/// Generate an unguessable, URL-safe `state` value.
///
/// 32 bytes from the OS-seeded CSPRNG, base64url without padding (43 chars).
/// There is no weak fallback: if the OS entropy source fails, the RNG panics.
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// A persisted, not yet validated authorization attempt
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthSession {
    /// Nonce sent as the `state` parameter
    pub state: String,
    /// Unix timestamp when the session was created
    pub created_at: u64,
}

impl std::fmt::Debug for PendingAuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthSession")
            .field("state", &redact(&self.state))
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl PendingAuthSession {
    fn generate() -> Self {
        Self {
            state: generate_state(),
            created_at: now_secs(),
        }
    }

    /// Whether the session is older than `ttl`
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        now_secs().saturating_sub(self.created_at) > ttl.as_secs()
    }

    /// Seconds since the session was created
    #[must_use]
    pub fn age(&self) -> Duration {
        Duration::from_secs(now_secs().saturating_sub(self.created_at))
    }
}

/// Compare two nonces without revealing the length of a matching prefix.
///
/// Both sides are hashed first so the byte comparison runs over fixed-size
/// digests unrelated to the attacker-supplied input.
fn states_match(expected: &str, received: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(received.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Persists the pending nonce before redirect and validates it on return
#[derive(Debug, Clone)]
pub struct SessionTracker {
    store: Arc<dyn SecureStore>,
    ttl: Duration,
}

impl SessionTracker {
    /// Create a tracker over `store` with the default session TTL
    #[must_use]
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self::with_ttl(store, DEFAULT_PENDING_SESSION_TTL)
    }

    /// Create a tracker with a custom session TTL
    #[must_use]
    pub fn with_ttl(store: Arc<dyn SecureStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Start a new session and persist it.
    ///
    /// Returns only once the store has confirmed the write, so the caller can
    /// open the browser immediately afterwards.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the session cannot be persisted. The
    /// browser must not be opened in that case.
    pub async fn begin(&self) -> Result<PendingAuthSession, StorageError> {
        let session = PendingAuthSession::generate();
        let serialized = serde_json::to_string(&session)?;
        self.store.set(PENDING_STATE_KEY, &serialized).await?;
        tracing::debug!(state = %redact(&session.state), "Pending auth session stored");
        Ok(session)
    }

    /// Load the pending session, if any.
    ///
    /// A record that no longer deserializes is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the store cannot be read.
    pub async fn pending(&self) -> Result<Option<PendingAuthSession>, StorageError> {
        let Some(raw) = self.store.get(PENDING_STATE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!("Discarding unreadable pending session: {e}");
                Ok(None)
            }
        }
    }

    /// Check `received_state` against the pending session.
    ///
    /// True only if a session exists, has not outlived the TTL, and its nonce
    /// equals `received_state` exactly. Does not consume the session.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the store cannot be read.
    pub async fn validate(&self, received_state: &str) -> Result<bool, StorageError> {
        if received_state.is_empty() {
            tracing::warn!("Rejecting callback with empty state");
            return Ok(false);
        }

        let Some(session) = self.pending().await? else {
            tracing::warn!("Rejecting callback: no pending auth session");
            return Ok(false);
        };

        if session.is_expired(self.ttl) {
            tracing::warn!(
                age_secs = session.age().as_secs(),
                "Rejecting callback: pending session expired"
            );
            return Ok(false);
        }

        let matched = states_match(&session.state, received_state);
        if !matched {
            tracing::warn!("Rejecting callback: state mismatch");
        }
        Ok(matched)
    }

    /// Delete the pending session. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the store rejects the delete.
    pub async fn consume(&self) -> Result<(), StorageError> {
        self.store.delete(PENDING_STATE_KEY).await?;
        tracing::debug!("Pending auth session consumed");
        Ok(())
    }
}
