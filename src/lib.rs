//! # oauth-deeplink
//!
//! OAuth 2.0 authorization-code sign-in for native apps that return from the
//! browser through a hosted HTTPS callback page and a custom URL scheme.
//! Async/await, strong typing, tokio-based.
//!
//! ## Quick Start
//!
//! ```no_run
//! use oauth_deeplink::{OAuthConfig, OAuthFlow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OAuthConfig::builder()
//!         .client_id("my-client")
//!         .authorize_url("https://provider.example.com/oauth/authorize")
//!         .redirect_uri("https://app.example.com/auth/callback")
//!         .backend_url("https://api.example.com")
//!         .build();
//!
//!     let mut flow = OAuthFlow::new(config)?;
//!     let request = flow.begin().await?;
//!     // Open request.url in the browser. When the OS delivers the deep link:
//!     let credentials = flow
//!         .handle_callback("myapp://auth/callback?code=...&state=...")
//!         .await?;
//!     println!("Token: {}", credentials.authorization_header());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`auth`]: nonce tracking, callback parsing, code exchange, token manager
//!   and the [`OAuthFlow`] orchestrator
//! - [`store`]: the [`SecureStore`](store::SecureStore) trait with keychain,
//!   file and in-memory backends
//! - [`config`]: [`OAuthConfig`] and environment loading
//! - [`error`]: error types and handling
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for structured logging.
//! Tracing events are always emitted but are zero-cost when no subscriber is attached.
//! Tokens, codes and nonces are logged as a short prefix only.
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Error Handling
//!
//! All fallible flow operations return [`Result<T, AuthError>`](Result):
//!
//! ```no_run
//! # use oauth_deeplink::{AuthError, OAuthFlow};
//! # async fn example(flow: &mut OAuthFlow, url: &str) {
//! match flow.handle_callback(url).await {
//!     Ok(credentials) => { /* signed in */ }
//!     Err(AuthError::Cancelled) => { /* back to the sign-in screen */ }
//!     Err(e) if e.is_retryable() => { /* offer "Try again" */ }
//!     Err(e) => eprintln!("Sign-in failed: {e}"),
//! }
//! # }
//! ```
//!
//! ## Examples
//!
//! - `deep_link_demo.rs` - Terminal walk-through of the full flow
//!
//! ```bash
//! cargo run --example deep_link_demo -- login
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use auth::{
    AuthorizationRequest, CredentialRecord, FlowState, OAuthFlow, TokenManager, UserData,
};
pub use config::OAuthConfig;
pub use error::{AuthError, Result};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
