//! Error types for the OAuth deep-link flow

use thiserror::Error;

use crate::auth::{CallbackError, ExchangeError};
use crate::store::StorageError;

/// Main error type for the OAuth deep-link flow
///
/// Every variant maps to a distinct user-facing outcome. None of them are
/// swallowed inside the crate; they all surface to the caller.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Callback URL was malformed or missing a required field.
    ///
    /// The user must restart the flow from the beginning.
    #[error("Invalid callback: {0}")]
    Parse(#[from] CallbackError),

    /// The `state` returned by the provider did not match the pending session.
    ///
    /// Deliberately carries no detail: an absent session, an expired session
    /// and a wrong value all produce the same error.
    #[error("Authentication failed: state validation did not pass")]
    CsrfValidation,

    /// The backend rejected the authorization code, or could not be reached
    #[error("Token exchange failed: {0}")]
    Exchange(#[from] ExchangeError),

    /// Secure storage unavailable or denied
    #[error("Cannot persist session: {0}")]
    Storage(#[from] StorageError),

    /// User dismissed the browser or denied access at the provider
    #[error("Authentication cancelled by user")]
    Cancelled,

    /// [`retry_exchange`](crate::auth::OAuthFlow::retry_exchange) was called
    /// with no failed exchange to retry
    #[error("Nothing to retry. Start a new sign-in.")]
    NothingToRetry,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for OAuth flow operations
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a CSRF validation error
    #[must_use]
    pub fn csrf() -> Self {
        Self::CsrfValidation
    }

    /// Whether the UI should offer a single user-driven retry.
    ///
    /// Only exchange failures qualify, via [`retry_exchange`]. Every other
    /// error leaves no pending session, so the flow restarts from [`begin`].
    ///
    /// [`retry_exchange`]: crate::auth::OAuthFlow::retry_exchange
    /// [`begin`]: crate::auth::OAuthFlow::begin
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exchange(_))
    }

    /// Whether this error means the user backed out rather than something failing
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exchange_errors_are_retryable() {
        assert!(AuthError::from(ExchangeError::failed("timeout")).is_retryable());
        assert!(!AuthError::csrf().is_retryable());
        assert!(!AuthError::Cancelled.is_retryable());
        assert!(!AuthError::from(CallbackError::MissingParameter("code")).is_retryable());
    }

    #[test]
    fn test_csrf_message_has_no_detail() {
        let msg = AuthError::csrf().to_string();
        assert!(!msg.contains("expired"));
        assert!(!msg.contains("missing"));
        assert!(!msg.contains("mismatch"));
    }

    #[test]
    fn test_parse_error_names_field() {
        let err = AuthError::from(CallbackError::MissingParameter("state"));
        assert!(err.to_string().contains("state"));
    }
}
