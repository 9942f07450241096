//! CostGuard CLI - sign in to CostGuard and inspect the persisted session.
//!
//! Every invocation restores the session from the configured token store
//! before running its command, the same way the dashboard does on load.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use costguard_core::{
    ApiClient, AuthError, AuthTransport, AwsAccountRequest, Config, Navigator, Router,
    SessionManager, Startup,
};

/// Region used when `accounts add` is given none.
const DEFAULT_REGION: &str = "us-east-1";

const USAGE: &str = "\
Usage: costguard <command>

Commands:
  login [email]                  Sign in (prompts for anything missing)
  signup <email> [first] [last]  Create an account and sign in
  logout                         Sign out and forget stored credentials
  refresh                        Exchange the refresh token for a new access token
  status                         Show the current session
  accounts [list]                List linked AWS accounts
  accounts add <alias> [region]  Validate and link an AWS account (prompts for keys)
  accounts remove <account-id>   Unlink an AWS account";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr through a non-blocking writer; the returned guard must
/// live until exit so buffered lines are flushed.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;
    let (client, manager) = build_manager(&config)?;

    info!(command = %command, "CostGuard CLI starting");
    restore(&manager).await;

    match command.as_str() {
        "login" => login(&manager, args.get(1).cloned()).await,
        "signup" => signup(&manager, &args[1..]).await,
        "logout" => {
            manager.sign_out();
            println!("Signed out.");
            Ok(())
        }
        "refresh" => refresh(&manager).await,
        "status" => status(&manager),
        "accounts" => accounts(&client, &manager, &args[1..]).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn build_manager(config: &Config) -> Result<(ApiClient, SessionManager)> {
    let store = config.open_token_store()?;
    let navigator: Arc<dyn Navigator> = Arc::new(Router::new("/"));
    let client = ApiClient::from_config(config, Arc::clone(&store), Arc::clone(&navigator))
        .context("Failed to build HTTP client")?;
    debug!(api = client.base_url(), "API client ready");

    let transport: Arc<dyn AuthTransport> = Arc::new(client.clone());
    let manager =
        SessionManager::new(transport, store, navigator).with_refresh_leeway(config.refresh_leeway());
    Ok((client, manager))
}

async fn restore(manager: &SessionManager) {
    match manager.initialize().await {
        Startup::Restored { profile_refresh } => {
            // Wait so `status` reflects the server's current profile.
            if let Err(e) = profile_refresh.await {
                debug!(error = %e, "Profile refresh task failed");
            }
        }
        outcome => debug!(?outcome, "Session startup resolved"),
    }
}

async fn login(manager: &SessionManager, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;
    require_credentials(&email, &password)?;

    let user = manager.sign_in(&email, &password).await.map_err(report)?;
    println!("Signed in as {} <{}>", user.display_name(), user.email);
    Ok(())
}

async fn signup(manager: &SessionManager, args: &[String]) -> Result<()> {
    let Some(email) = args.first() else {
        bail!("Usage: costguard signup <email> [first] [last]");
    };
    let password = rpassword::prompt_password("Password: ")?;
    require_credentials(email, &password)?;

    let first_name = args.get(1).map(String::as_str);
    let last_name = args.get(2).map(String::as_str);
    let user = manager
        .sign_up(email, &password, first_name, last_name)
        .await
        .map_err(report)?;
    println!("Account ready. Signed in as {} <{}>", user.display_name(), user.email);
    Ok(())
}

async fn refresh(manager: &SessionManager) -> Result<()> {
    if !manager.snapshot().is_authenticated() {
        bail!("Not signed in. Run `costguard login` first.");
    }
    manager.refresh_token().await.map_err(report)?;
    println!("Access token refreshed.");
    Ok(())
}

fn status(manager: &SessionManager) -> Result<()> {
    let snapshot = manager.snapshot().snapshot();
    let rendered = serde_json::to_string_pretty(&snapshot).context("Failed to render session")?;
    println!("{}", rendered);
    Ok(())
}

async fn accounts(client: &ApiClient, manager: &SessionManager, args: &[String]) -> Result<()> {
    // The client reads the stored token, so make sure it is current first.
    manager.ensure_fresh_token().await.map_err(report)?;

    match args.first().map(String::as_str) {
        None | Some("list") => {
            let accounts = client.list_accounts().await?;
            if accounts.is_empty() {
                println!("No AWS accounts linked.");
            }
            for account in accounts {
                println!(
                    "{}\t{}\t{}\t{}\t{:?}",
                    account.account_id,
                    account.aws_account_id,
                    account.account_alias,
                    account.region,
                    account.status
                );
            }
            Ok(())
        }
        Some("add") => {
            let Some(alias) = args.get(1) else {
                bail!("Usage: costguard accounts add <alias> [region]");
            };
            let region = args.get(2).map(String::as_str).unwrap_or(DEFAULT_REGION);
            let access_key_id = prompt("Access key ID: ")?;
            let secret_access_key = rpassword::prompt_password("Secret access key: ")?;
            let request = account_request(alias, region, access_key_id, secret_access_key)?;

            let response = client.validate_and_add_account(&request).await?;
            println!(
                "Linked {} ({})",
                request.account_alias,
                response.account_id.as_deref().unwrap_or("pending")
            );
            Ok(())
        }
        Some("remove") => {
            let Some(account_id) = args.get(1).filter(|id| !id.trim().is_empty()) else {
                bail!("Usage: costguard accounts remove <account-id>");
            };
            client.remove_account(account_id.trim()).await?;
            println!("Removed {}", account_id.trim());
            Ok(())
        }
        Some(other) => bail!("Unknown accounts command: {}\n\n{}", other, USAGE),
    }
}

fn account_request(
    alias: &str,
    region: &str,
    access_key_id: String,
    secret_access_key: String,
) -> Result<AwsAccountRequest> {
    if alias.trim().is_empty() || access_key_id.is_empty() || secret_access_key.is_empty() {
        bail!("Account alias, access key ID and secret access key required");
    }
    Ok(AwsAccountRequest {
        access_key_id,
        secret_access_key,
        region: region.to_string(),
        account_alias: alias.trim().to_string(),
    })
}

/// Empty fields never reach the API.
fn require_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        bail!("Email and password required");
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn report(err: AuthError) -> anyhow::Error {
    anyhow::Error::new(err).context("Authentication failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_credentials_rejects_blank_fields() {
        assert!(require_credentials("a@b.com", "pw").is_ok());
        assert!(require_credentials("", "pw").is_err());
        assert!(require_credentials("   ", "pw").is_err());
        assert!(require_credentials("a@b.com", "").is_err());
    }

    #[test]
    fn test_account_request_requires_keys() {
        let request = account_request(" prod ", "eu-west-1", "AKIA".into(), "secret".into()).unwrap();
        assert_eq!(request.account_alias, "prod");
        assert_eq!(request.region, "eu-west-1");

        assert!(account_request("prod", DEFAULT_REGION, String::new(), "secret".into()).is_err());
        assert!(account_request("prod", DEFAULT_REGION, "AKIA".into(), String::new()).is_err());
        assert!(account_request("  ", DEFAULT_REGION, "AKIA".into(), "secret".into()).is_err());
    }
}
