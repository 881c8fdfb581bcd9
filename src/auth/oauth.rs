//! Authorization-code flow orchestration

use std::sync::Arc;
use url::Url;

use super::callback::{AuthorizationResult, CallbackError, parse_callback_url};
use super::exchange::{HttpTokenExchange, TokenExchange};
use super::state::SessionTracker;
use super::token::{CredentialRecord, TokenManager};
use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::store::{KeyringStore, SecureStore};
use crate::utils::redact;

/// Where the flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// No sign-in in progress
    Idle,
    /// Nonce persisted, waiting for the browser to come back
    PendingAuth,
    /// Credentials stored
    Authenticated,
    /// Last attempt failed; the next [`OAuthFlow::begin`] starts over
    Failed,
}

/// URL to open in the browser, plus the nonce it carries
#[derive(Clone)]
pub struct AuthorizationRequest {
    /// Full authorization URL
    pub url: String,
    /// CSRF nonce included as `state`
    pub state: String,
}

impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("url", &self.url)
            .field("state", &redact(&self.state))
            .finish()
    }
}

/// Builder for [`OAuthFlow`]
#[derive(Debug, Default)]
pub struct OAuthFlowBuilder {
    config: Option<OAuthConfig>,
    store: Option<Arc<dyn SecureStore>>,
    exchange: Option<Arc<dyn TokenExchange>>,
}

impl OAuthFlowBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the OAuth configuration (required)
    #[must_use]
    pub fn config(mut self, config: OAuthConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the secure store (default: platform keychain under `service_name`)
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the code exchanger (default: [`HttpTokenExchange`] against `backend_url`)
    #[must_use]
    pub fn exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Build the flow
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if no configuration was given or
    /// it fails validation.
    pub fn build(self) -> Result<OAuthFlow> {
        let config = self
            .config
            .ok_or_else(|| AuthError::invalid_config("OAuthFlow requires a configuration"))?;
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(KeyringStore::new(config.service_name.clone())),
        };
        let exchange = match self.exchange {
            Some(exchange) => exchange,
            None => Arc::new(HttpTokenExchange::new(&config)?),
        };

        Ok(OAuthFlow {
            tracker: SessionTracker::with_ttl(Arc::clone(&store), config.pending_session_ttl),
            tokens: TokenManager::new(store),
            exchange,
            config,
            state: FlowState::Idle,
            retry: None,
        })
    }
}

/// Drives one sign-in at a time from nonce to stored credentials.
///
/// This is the context object the app creates at startup and keeps for its
/// lifetime. Hand [`tokens`](Self::tokens) to anything that only needs to read
/// credentials.
///
/// ```no_run
/// use oauth_deeplink::{OAuthConfig, OAuthFlow};
///
/// # async fn example(callback_url: &str) -> oauth_deeplink::Result<()> {
/// let mut flow = OAuthFlow::new(OAuthConfig::from_env()?)?;
///
/// let request = flow.begin().await?;
/// // open request.url in the system browser, wait for the deep link...
///
/// let credentials = flow.handle_callback(callback_url).await?;
/// println!("Signed in as {:?}", credentials.user_data.email());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OAuthFlow {
    config: OAuthConfig,
    tracker: SessionTracker,
    tokens: TokenManager,
    exchange: Arc<dyn TokenExchange>,
    state: FlowState,
    // Validated callback kept for one user-driven exchange retry
    retry: Option<AuthorizationResult>,
}

impl OAuthFlow {
    /// Create a flow with the platform keychain and HTTP exchange
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: OAuthConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder() -> OAuthFlowBuilder {
        OAuthFlowBuilder::new()
    }

    /// Get the OAuth configuration
    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Current flow state
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Token manager sharing this flow's store
    #[must_use]
    pub fn tokens(&self) -> TokenManager {
        self.tokens.clone()
    }

    /// Session tracker sharing this flow's store
    #[must_use]
    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Re-derive the flow state from storage after an app restart.
    ///
    /// Stored credentials win over a pending session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the store cannot be read.
    pub async fn restore(&mut self) -> Result<FlowState> {
        self.state = if self.tokens.is_authenticated().await? {
            FlowState::Authenticated
        } else if self.tracker.pending().await?.is_some() {
            FlowState::PendingAuth
        } else {
            FlowState::Idle
        };
        tracing::debug!(state = ?self.state, "Flow state restored");
        Ok(self.state)
    }

    /// Start a sign-in.
    ///
    /// Persists a fresh nonce and returns the authorization URL. The nonce is
    /// durable once this returns, so the browser can be opened right away.
    /// Any earlier pending session is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the nonce cannot be persisted, or
    /// [`AuthError::InvalidConfig`] if the authorization URL is malformed.
    pub async fn begin(&mut self) -> Result<AuthorizationRequest> {
        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| AuthError::invalid_config(format!("authorize_url: {e}")))?;

        self.retry = None;
        let session = match self.tracker.begin().await {
            Ok(session) => session,
            Err(e) => {
                self.state = FlowState::Failed;
                return Err(e.into());
            }
        };

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("state", &session.state);
            if let Some(scopes) = &self.config.scopes {
                query.append_pair("scope", scopes);
            }
        }

        self.state = FlowState::PendingAuth;
        tracing::debug!(state = %redact(&session.state), "Authorization started");

        Ok(AuthorizationRequest {
            url: url.into(),
            state: session.state,
        })
    }

    /// Complete a sign-in from the deep-link callback URL.
    ///
    /// Steps, in order: parse, validate `state`, consume the pending session,
    /// exchange the code, store the credentials. The pending session is
    /// consumed whether or not validation passes.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Cancelled`] if the user denied access at the provider
    /// - [`AuthError::Parse`] if the URL is malformed or lacks `code`/`state`
    /// - [`AuthError::CsrfValidation`] if `state` does not match; no exchange
    ///   is attempted
    /// - [`AuthError::Exchange`] if the backend rejected the code or was
    ///   unreachable; [`retry_exchange`](Self::retry_exchange) may be called once
    /// - [`AuthError::Storage`] if the store fails at any step
    pub async fn handle_callback(&mut self, callback_url: &str) -> Result<CredentialRecord> {
        self.retry = None;

        let result = match parse_callback_url(callback_url) {
            Ok(result) => result,
            Err(CallbackError::Denied) => {
                tracing::debug!("Authorization denied at provider");
                self.tracker.consume().await?;
                self.settle(FlowState::Idle).await;
                return Err(AuthError::Cancelled);
            }
            Err(e) => {
                tracing::warn!("Rejecting callback: {e}");
                self.tracker.consume().await?;
                self.settle(FlowState::Failed).await;
                return Err(e.into());
            }
        };

        // Consume even when validation errors out
        let validated = self.tracker.validate(&result.state).await;
        let consumed = self.tracker.consume().await;
        let valid = match (validated, consumed) {
            (Ok(valid), Ok(())) => valid,
            (Err(e), _) | (_, Err(e)) => {
                self.state = FlowState::Failed;
                return Err(e.into());
            }
        };

        if !valid {
            self.settle(FlowState::Failed).await;
            return Err(AuthError::csrf());
        }

        self.complete(result).await
    }

    /// Retry the code exchange once after an [`AuthError::Exchange`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NothingToRetry`] if the last callback did not end
    /// in an exchange failure or was already retried; otherwise the same
    /// errors as the exchange and storage steps of
    /// [`handle_callback`](Self::handle_callback).
    pub async fn retry_exchange(&mut self) -> Result<CredentialRecord> {
        let Some(result) = self.retry.take() else {
            return Err(AuthError::NothingToRetry);
        };
        tracing::debug!("Retrying token exchange");
        let outcome = self.complete(result).await;
        // One retry only
        self.retry = None;
        outcome
    }

    async fn complete(&mut self, result: AuthorizationResult) -> Result<CredentialRecord> {
        let exchanged = self
            .exchange
            .exchange(&result.code, result.installation_id.as_deref())
            .await;
        let response = match exchanged {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Token exchange failed: {e}");
                self.state = FlowState::Failed;
                self.retry = Some(result);
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .tokens
            .store_tokens(&response.access_token, &response.user_data)
            .await
        {
            tracing::warn!("Could not persist credentials: {e}");
            self.state = FlowState::Failed;
            return Err(e.into());
        }

        self.state = FlowState::Authenticated;
        tracing::info!(user_id = ?response.user_data.user_id(), "Sign-in complete");

        Ok(CredentialRecord {
            access_token: response.access_token,
            user_data: response.user_data,
        })
    }

    // A callback that never reached the exchange leaves earlier credentials
    // untouched, so the flow stays Authenticated when they exist.
    async fn settle(&mut self, otherwise: FlowState) {
        self.state = match self.tokens.is_authenticated().await {
            Ok(true) => FlowState::Authenticated,
            Ok(false) => otherwise,
            Err(e) => {
                tracing::warn!("Could not read credentials: {e}");
                otherwise
            }
        };
    }

    /// The user dismissed the browser without finishing.
    ///
    /// Clears the pending session and returns to [`FlowState::Idle`]. Stored
    /// credentials from an earlier sign-in are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the pending session cannot be deleted.
    pub async fn cancel(&mut self) -> Result<()> {
        self.retry = None;
        self.tracker.consume().await?;
        self.state = if self.tokens.is_authenticated().await? {
            FlowState::Authenticated
        } else {
            FlowState::Idle
        };
        tracing::debug!(state = ?self.state, "Authorization cancelled");
        Ok(())
    }

    /// Delete stored credentials and return to [`FlowState::Idle`]
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the credentials cannot be deleted.
    pub async fn sign_out(&mut self) -> Result<()> {
        self.retry = None;
        self.tokens.clear_tokens().await?;
        self.state = FlowState::Idle;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Whether credentials are stored
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the store cannot be read.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.tokens.is_authenticated().await?)
    }
}
