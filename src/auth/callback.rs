//! Deep-link callback parsing
//!
//! The hosted callback page forwards the provider's redirect to the app as
//! `scheme://auth/callback?code=…&state=…&installation_id=…`. The installation
//! identifier has shipped under three names across provider surfaces, so it
//! is resolved from `installation_id`, then `configurationId`, then
//! `config_id`, in that order.

use std::collections::HashMap;
use thiserror::Error;
use url::Url;

use crate::utils::redact;

/// Query parameter names for the installation id, highest precedence first
pub const INSTALLATION_ID_PARAMS: [&str; 3] = ["installation_id", "configurationId", "config_id"];

/// Errors produced while parsing a callback URL
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// The URL itself could not be parsed
    #[error("callback URL is malformed: {0}")]
    InvalidUrl(String),

    /// A required query parameter is absent or empty
    #[error("callback URL is missing required parameter `{0}`")]
    MissingParameter(&'static str),

    /// The user declined authorization at the provider
    #[error("authorization was denied by the user")]
    Denied,

    /// The provider redirected with an OAuth error
    #[error("provider returned error `{error}`{}", detail_suffix(.description.as_deref()))]
    Provider {
        /// OAuth `error` code
        error: String,
        /// OAuth `error_description`, if provided
        description: Option<String>,
    },
}

/// Fields extracted from a successful callback
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    /// Authorization code to exchange
    pub code: String,
    /// Echoed CSRF state
    pub state: String,
    /// Provider installation identifier, when the provider sent one
    pub installation_id: Option<String>,
}

impl std::fmt::Debug for AuthorizationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationResult")
            .field("code", &redact(&self.code))
            .field("state", &redact(&self.state))
            .field("installation_id", &self.installation_id)
            .finish()
    }
}

fn detail_suffix(description: Option<&str>) -> String {
    description.map(|d| format!(": {d}")).unwrap_or_default()
}

fn collect_params(query: Option<&str>) -> HashMap<String, String> {
    // First occurrence of a repeated parameter wins
    let mut params = HashMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
    }
    params
}

fn non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Parse a deep-link callback URL.
///
/// Parameters come from the query string. If the query carries no `code`
/// and no `error`, the fragment is read as a query string instead.
///
/// # Errors
///
/// - [`CallbackError::InvalidUrl`] if `url` does not parse
/// - [`CallbackError::Denied`] / [`CallbackError::Provider`] if the provider
///   redirected with `error=…`
/// - [`CallbackError::MissingParameter`] naming `code` or `state`
///
/// # Example
///
/// ```
/// use oauth_deeplink::auth::parse_callback_url;
///
/// let result = parse_callback_url(
///     "myapp://auth/callback?code=abc&state=xyz&config_id=cfg_1",
/// ).unwrap();
/// assert_eq!(result.code, "abc");
/// assert_eq!(result.installation_id.as_deref(), Some("cfg_1"));
/// ```
pub fn parse_callback_url(url: &str) -> Result<AuthorizationResult, CallbackError> {
    let parsed = Url::parse(url.trim()).map_err(|e| CallbackError::InvalidUrl(e.to_string()))?;

    let mut params = collect_params(parsed.query());
    if !params.contains_key("code") && !params.contains_key("error") {
        let fragment = collect_params(parsed.fragment());
        if fragment.contains_key("code") || fragment.contains_key("error") {
            params = fragment;
        }
    }

    if let Some(error) = non_empty(&params, "error") {
        if error == "access_denied" {
            return Err(CallbackError::Denied);
        }
        return Err(CallbackError::Provider {
            error: error.to_string(),
            description: non_empty(&params, "error_description").map(str::to_string),
        });
    }

    let code = non_empty(&params, "code").ok_or(CallbackError::MissingParameter("code"))?;
    let state = non_empty(&params, "state").ok_or(CallbackError::MissingParameter("state"))?;
    let installation_id = INSTALLATION_ID_PARAMS
        .iter()
        .find_map(|name| non_empty(&params, name))
        .map(str::to_string);

    Ok(AuthorizationResult {
        code: code.to_string(),
        state: state.to_string(),
        installation_id,
    })
}
