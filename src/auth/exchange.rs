//! Server-side authorization code exchange
//!
//! The app never holds a client secret. It sends the authorization code (and
//! installation id, if any) to its own backend, which talks to the provider
//! and returns the access token together with the user's profile.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::token::UserData;
use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::utils::{redact, safe_truncate};

/// Upper bound on how much of an error body is kept in [`ExchangeError::Rejected`]
const MAX_ERROR_BODY: usize = 512;

/// Errors that can occur while exchanging an authorization code
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The backend answered with a 4xx status (e.g. invalid or used code)
    #[error("server rejected the authorization code (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error reported by the backend
        message: String,
    },

    /// The backend or a gateway in front of it answered with a 5xx status
    #[error("exchange endpoint is unavailable (HTTP {status}): {message}")]
    Unavailable {
        /// HTTP status code
        status: u16,
        /// Error body, if any
        message: String,
    },

    /// The request never got an answer (timeout, DNS, connection refused)
    #[error("could not reach the exchange endpoint: {0}")]
    Failed(String),

    /// The backend answered 2xx but the body was not a token response
    #[error("invalid response from exchange endpoint: {0}")]
    InvalidResponse(String),
}

impl ExchangeError {
    /// Create a network-level failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Whether the backend itself rejected the code, as opposed to being unreachable
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Request body for `POST /exchange-token`
#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    installation_id: Option<&'a str>,
}

/// Successful exchange result
#[derive(Clone, Deserialize)]
pub struct ExchangeResponse {
    /// Access token for API calls
    pub access_token: String,
    /// User profile returned alongside the token
    #[serde(default)]
    pub user_data: UserData,
}

impl std::fmt::Debug for ExchangeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeResponse")
            .field("access_token", &redact(&self.access_token))
            .field("user_data", &self.user_data)
            .finish()
    }
}

/// Error body shapes the backend may return
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        if let Some(msg) = parsed
            .error_description
            .or(parsed.message)
            .or(parsed.error)
        {
            return msg;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error details".to_string()
    } else {
        safe_truncate(trimmed, MAX_ERROR_BODY).to_string()
    }
}

/// Exchanges an authorization code for credentials.
///
/// Implementations perform exactly one attempt; retrying is the caller's
/// decision.
#[async_trait]
pub trait TokenExchange: Send + Sync + std::fmt::Debug {
    /// Exchange `code` for an access token and user profile
    async fn exchange(
        &self,
        code: &str,
        installation_id: Option<&str>,
    ) -> std::result::Result<ExchangeResponse, ExchangeError>;
}

/// [`TokenExchange`] that posts to the backend's `/exchange-token` endpoint
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpTokenExchange {
    /// Create an exchange client for the endpoint described by `config`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.exchange_endpoint(),
            http_client,
        })
    }

    /// Create an exchange client posting to an explicit URL with a shared HTTP client
    pub fn with_client(endpoint: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http_client,
        }
    }

    /// The exchange endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(
        &self,
        code: &str,
        installation_id: Option<&str>,
    ) -> std::result::Result<ExchangeResponse, ExchangeError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            code = %redact(code),
            installation_id = ?installation_id,
            "Exchanging authorization code"
        );

        let body = ExchangeRequest {
            code,
            installation_id,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExchangeError::failed(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| ExchangeError::failed(e.to_string()))?;

        if status.is_server_error() {
            let message = error_message(&response_text);
            tracing::warn!(status = status.as_u16(), "Exchange endpoint unavailable: {message}");
            return Err(ExchangeError::Unavailable {
                status: status.as_u16(),
                message,
            });
        }

        if !status.is_success() {
            let message = error_message(&response_text);
            tracing::warn!(status = status.as_u16(), "Token exchange rejected: {message}");
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ExchangeResponse = serde_json::from_str(&response_text).map_err(|e| {
            ExchangeError::InvalidResponse(format!("failed to parse token response: {e}"))
        })?;

        if parsed.access_token.is_empty() {
            return Err(ExchangeError::InvalidResponse(
                "access_token is empty".to_string(),
            ));
        }

        tracing::debug!(token = %redact(&parsed.access_token), "Token exchange succeeded");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpTokenExchange {
        let config = OAuthConfig::builder()
            .client_id("client")
            .authorize_url("https://provider.example.com/authorize")
            .redirect_uri("https://app.example.com/callback")
            .backend_url(server.uri())
            .request_timeout(Duration::from_secs(2))
            .build();
        HttpTokenExchange::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/exchange-token"))
            .and(body_json(serde_json::json!({
                "code": "abc",
                "installation_id": "inst1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "user_data": {
                    "user_id": "u1",
                    "email": "u1@example.com",
                    "team_id": "t1",
                    "plan": "pro"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .exchange("abc", Some("inst1"))
            .await
            .unwrap();

        assert_eq!(response.access_token, "tok");
        assert_eq!(response.user_data.user_id(), Some("u1"));
        assert_eq!(response.user_data.email(), Some("u1@example.com"));
        assert_eq!(response.user_data.team_id(), Some("t1"));
        assert_eq!(
            response.user_data.get("plan"),
            Some(&serde_json::json!("pro"))
        );
    }

    #[tokio::test]
    async fn test_installation_id_omitted_when_absent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/exchange-token"))
            .and(body_json(serde_json::json!({ "code": "abc" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server).exchange("abc", None).await.unwrap();
        assert!(response.user_data.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_code() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/exchange-token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "code already used"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).exchange("used", None).await.unwrap_err();
        match err {
            ExchangeError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "code already used");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_plain_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/exchange-token"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).exchange("abc", None).await.unwrap_err();
        assert!(!err.is_rejected());
        match &err {
            ExchangeError::Unavailable { status, message } => {
                assert_eq!(*status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert!(!err.to_string().contains("authorization code"));
    }

    #[tokio::test]
    async fn test_invalid_success_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/exchange-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).exchange("abc", None).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_failed() {
        let exchange = HttpTokenExchange::with_client(
            "http://127.0.0.1:9/exchange-token",
            reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap(),
        );

        let err = exchange.exchange("abc", None).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Failed(_)));
        assert!(!err.is_rejected());
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(r#"{"error":"invalid_grant"}"#), "invalid_grant");
        assert_eq!(error_message(r#"{"message":"nope"}"#), "nope");
        assert_eq!(error_message("   "), "no error details");
        assert_eq!(error_message("plain"), "plain");
    }
}
