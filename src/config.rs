//! OAuth flow configuration

use std::time::Duration;
use typed_builder::TypedBuilder;
use url::Url;

use crate::error::{AuthError, Result};
use crate::store::DEFAULT_SERVICE_NAME;

/// Path of the backend's code exchange endpoint, relative to `backend_url`
pub const EXCHANGE_TOKEN_PATH: &str = "/exchange-token";

/// How long a pending session stays valid while the user is in the browser
pub const DEFAULT_PENDING_SESSION_TTL: Duration = Duration::from_secs(600);

/// Timeout for the exchange request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth configuration
///
/// ```
/// use oauth_deeplink::OAuthConfig;
///
/// let config = OAuthConfig::builder()
///     .client_id("my-client")
///     .authorize_url("https://provider.example.com/oauth/authorize")
///     .redirect_uri("https://app.example.com/auth/callback")
///     .backend_url("https://api.example.com")
///     .build();
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.exchange_endpoint(), "https://api.example.com/exchange-token");
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct OAuthConfig {
    /// OAuth client ID
    #[builder(setter(into))]
    pub client_id: String,

    /// Provider authorization endpoint
    #[builder(setter(into))]
    pub authorize_url: String,

    /// Hosted HTTPS callback page that forwards to the app's deep link
    #[builder(setter(into))]
    pub redirect_uri: String,

    /// Base URL of the backend performing the code exchange
    #[builder(setter(into))]
    pub backend_url: String,

    /// Space-separated scopes to request
    #[builder(default, setter(strip_option, into))]
    pub scopes: Option<String>,

    /// Namespace for secure storage keys
    #[builder(default = DEFAULT_SERVICE_NAME.to_string(), setter(into))]
    pub service_name: String,

    /// Maximum age of a pending session at callback time
    #[builder(default = DEFAULT_PENDING_SESSION_TTL)]
    pub pending_session_ttl: Duration,

    /// Timeout for the token exchange request
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,
}

impl OAuthConfig {
    /// Load configuration from `OAUTH_*` environment variables.
    ///
    /// Required: `OAUTH_CLIENT_ID`, `OAUTH_AUTHORIZE_URL`,
    /// `OAUTH_REDIRECT_URI`, `OAUTH_BACKEND_URL`.
    /// Optional: `OAUTH_SCOPES`, `OAUTH_SERVICE_NAME`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if a required variable is missing
    /// or the result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::invalid_config(format!("{key} is not set")))
        };

        let config = Self {
            client_id: required("OAUTH_CLIENT_ID")?,
            authorize_url: required("OAUTH_AUTHORIZE_URL")?,
            redirect_uri: required("OAUTH_REDIRECT_URI")?,
            backend_url: required("OAUTH_BACKEND_URL")?,
            scopes: lookup("OAUTH_SCOPES").filter(|v| !v.trim().is_empty()),
            service_name: lookup("OAUTH_SERVICE_NAME")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            pending_session_ttl: DEFAULT_PENDING_SESSION_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that URLs parse and the redirect target is the HTTPS callback page
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::invalid_config("client_id is empty"));
        }

        parse_url("authorize_url", &self.authorize_url)?;
        parse_url("backend_url", &self.backend_url)?;

        let redirect = parse_url("redirect_uri", &self.redirect_uri)?;
        if redirect.scheme() != "https" {
            return Err(AuthError::invalid_config(format!(
                "redirect_uri must use https, got {}",
                redirect.scheme()
            )));
        }

        if self.pending_session_ttl.is_zero() {
            return Err(AuthError::invalid_config("pending_session_ttl is zero"));
        }

        Ok(())
    }

    /// Full URL of the code exchange endpoint
    #[must_use]
    pub fn exchange_endpoint(&self) -> String {
        format!(
            "{}{EXCHANGE_TOKEN_PATH}",
            self.backend_url.trim_end_matches('/')
        )
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| AuthError::invalid_config(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> OAuthConfig {
        OAuthConfig::builder()
            .client_id("client")
            .authorize_url("https://provider.example.com/authorize")
            .redirect_uri("https://app.example.com/callback")
            .backend_url("https://api.example.com/")
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let config = sample();
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.pending_session_ttl, DEFAULT_PENDING_SESSION_TTL);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.scopes.is_none());
    }

    #[test]
    fn test_exchange_endpoint_trims_trailing_slash() {
        assert_eq!(
            sample().exchange_endpoint(),
            "https://api.example.com/exchange-token"
        );
    }

    #[test]
    fn test_validate_rejects_plain_http_redirect() {
        let mut config = sample();
        config.redirect_uri = "http://app.example.com/callback".to_string();
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig(msg)) if msg.contains("https")
        ));
    }

    #[test]
    fn test_validate_rejects_unparseable_url() {
        let mut config = sample();
        config.authorize_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig(msg)) if msg.starts_with("authorize_url")
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OAUTH_CLIENT_ID", "env-client"),
            ("OAUTH_AUTHORIZE_URL", "https://provider.example.com/authorize"),
            ("OAUTH_REDIRECT_URI", "https://app.example.com/callback"),
            ("OAUTH_BACKEND_URL", "https://api.example.com"),
            ("OAUTH_SCOPES", "read write"),
        ]);

        let config = OAuthConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(config.client_id, "env-client");
        assert_eq!(config.scopes.as_deref(), Some("read write"));
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn test_from_lookup_missing_required() {
        let result = OAuthConfig::from_lookup(|_| None);
        assert!(matches!(
            result,
            Err(AuthError::InvalidConfig(msg)) if msg.contains("OAUTH_CLIENT_ID")
        ));
    }
}
