//! Deep-link OAuth Demo
//!
//! Walks through the sign-in flow from a terminal:
//! 1. Persist a CSRF nonce and print the authorization URL
//! 2. Open the browser
//! 3. Paste the deep link the hosted callback page redirected to
//! 4. Exchange the code through the backend and store the credentials
//!
//! Configure with `OAUTH_CLIENT_ID`, `OAUTH_AUTHORIZE_URL`,
//! `OAUTH_REDIRECT_URI`, `OAUTH_BACKEND_URL` (and optionally `OAUTH_SCOPES`).
//!
//! Run with: cargo run --example deep_link_demo -- login

use oauth_deeplink::store::{FileStore, KeyringStore, SecureStore};
use oauth_deeplink::{AuthError, CredentialRecord, OAuthConfig, OAuthFlow};
use std::io::{BufRead, Write};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oauth_deeplink=debug".parse().unwrap()),
        )
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "login".to_string());
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let config = OAuthConfig::from_env()?;
    let mut flow = OAuthFlow::builder()
        .store(select_store(&config))
        .config(config)
        .build()?;

    match command.as_str() {
        "login" | "--login" => login(&mut flow).await,
        "status" | "--status" => status(&mut flow).await,
        "logout" | "--logout" => {
            flow.sign_out().await?;
            println!("✓ Signed out");
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            Ok(())
        }
    }
}

fn select_store(config: &OAuthConfig) -> Arc<dyn SecureStore> {
    let keyring = KeyringStore::new(config.service_name.clone());
    if keyring.is_available() {
        Arc::new(keyring)
    } else {
        let file = FileStore::new(&config.service_name);
        println!("(No keychain available - using {})", file.path().display());
        Arc::new(file)
    }
}

async fn login(flow: &mut OAuthFlow) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(record) = flow.tokens().credentials().await? {
        println!("✓ Already signed in");
        print_credentials(&record);
        return Ok(());
    }

    let request = flow.begin().await?;

    println!();
    println!("To sign in:");
    println!("  1. Open the following URL in your browser");
    println!("  2. Approve access");
    println!("  3. Copy the app link the callback page opens (scheme://auth/callback?...)");
    println!("  4. Paste it below");
    println!();
    println!("Authorization URL:");
    println!("  {}", request.url);
    println!();

    if let Err(e) = open_browser(&request.url) {
        println!("(Could not open browser automatically: {e})");
    }

    let input = prompt("Callback URL (or 'cancel'): ")?;
    if input.is_empty() || input.eq_ignore_ascii_case("cancel") {
        flow.cancel().await?;
        println!("Sign-in cancelled.");
        return Ok(());
    }

    let record = match flow.handle_callback(&input).await {
        Ok(record) => record,
        Err(e) if e.is_retryable() => {
            println!("Sign-in failed: {e}");
            let again = prompt("Try again? [y/N] ")?;
            if !again.eq_ignore_ascii_case("y") {
                return Err(e.into());
            }
            flow.retry_exchange().await?
        }
        Err(AuthError::Cancelled) => {
            println!("Access was denied at the provider.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    println!("✓ Signed in!");
    print_credentials(&record);
    Ok(())
}

async fn status(flow: &mut OAuthFlow) -> Result<(), Box<dyn std::error::Error>> {
    println!("Flow state: {:?}", flow.restore().await?);

    match flow.tokens().credentials().await? {
        Some(record) => print_credentials(&record),
        None => println!("Not signed in."),
    }

    if let Some(pending) = flow.tracker().pending().await? {
        println!("Pending sign-in started {}s ago", pending.age().as_secs());
    }
    Ok(())
}

fn prompt(label: &str) -> std::io::Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    std::process::Command::new("open").arg(url).spawn()?;

    #[cfg(target_os = "linux")]
    std::process::Command::new("xdg-open").arg(url).spawn()?;

    #[cfg(target_os = "windows")]
    std::process::Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn()?;

    Ok(())
}

fn print_credentials(record: &CredentialRecord) {
    println!("Credentials:");
    println!(
        "  Access Token: {}",
        oauth_deeplink::utils::redact(&record.access_token)
    );
    if let Some(user_id) = record.user_data.user_id() {
        println!("  User: {user_id}");
    }
    if let Some(email) = record.user_data.email() {
        println!("  Email: {email}");
    }
    if let Some(team_id) = record.user_data.team_id() {
        println!("  Team: {team_id}");
    }
}

fn print_help() {
    println!("Usage: cargo run --example deep_link_demo [COMMAND]");
    println!();
    println!("Commands:");
    println!("  login      Start sign-in (default)");
    println!("  status     Show stored credentials and pending sign-in");
    println!("  logout     Delete stored credentials");
    println!("  help       Show this help message");
}
