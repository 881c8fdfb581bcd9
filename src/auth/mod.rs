//! OAuth authorization-code flow for native apps
//!
//! # Overview
//!
//! The flow bridges the system browser back into the app through a hosted
//! HTTPS callback page that redirects to a custom-scheme deep link:
//!
//! 1. Generate a CSRF nonce and persist it ([`SessionTracker::begin`])
//! 2. Open the browser at the authorization URL carrying the nonce as `state`
//! 3. The provider redirects to the hosted callback page, which forwards to
//!    `scheme://auth/callback?code=…&state=…&installation_id=…`
//! 4. Parse the deep link ([`parse_callback_url`]) and validate `state`
//! 5. Exchange the code through the app's backend ([`TokenExchange`])
//! 6. Store the token and profile ([`TokenManager`])
//!
//! [`OAuthFlow`] runs steps 1 and 4-6 and tracks the [`FlowState`].
//!
//! # Example
//!
//! ```no_run
//! use oauth_deeplink::auth::OAuthFlow;
//! use oauth_deeplink::OAuthConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut flow = OAuthFlow::new(OAuthConfig::from_env()?)?;
//!
//!     if flow.is_authenticated().await? {
//!         println!("Already signed in");
//!         return Ok(());
//!     }
//!
//!     let request = flow.begin().await?;
//!     println!("Open {}", request.url);
//!     Ok(())
//! }
//! ```
//!
//! # Security
//!
//! - The nonce has 256 bits of entropy and is single-use
//! - `state` mismatches are reported without saying why
//! - No client secret lives in the app; the backend performs the exchange
//! - Secrets appear in logs and `Debug` output only as a short prefix

mod callback;
mod exchange;
mod oauth;
mod state;
mod token;

pub use callback::{AuthorizationResult, CallbackError, INSTALLATION_ID_PARAMS, parse_callback_url};
pub use exchange::{ExchangeError, ExchangeResponse, HttpTokenExchange, TokenExchange};
pub use oauth::{AuthorizationRequest, FlowState, OAuthFlow, OAuthFlowBuilder};
pub use state::{PendingAuthSession, SessionTracker, generate_state};
pub use token::{CredentialRecord, TokenManager, UserData};
