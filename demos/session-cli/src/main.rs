//! Session CLI Demo
//!
//! Drives a persisted API session from the command line:
//! 1. `login` exchanges credentials for tokens and caches them on disk
//! 2. `status` restores the cached session without touching the network
//! 3. `get` sends an authenticated GET; expired tokens are refreshed on the fly
//! 4. `logout` tears the session down locally and on the server
//!
//! Run with:
//!   SESSION_API_BASE_URL=https://api.example.com \
//!     cargo run -p session-cli -- login --email me@example.com --password secret
//!   cargo run -p session-cli -- get /content?limit=5

use anyhow::Context;
use clap::{Parser, Subcommand};
use session_api_client::api::auth::Credentials;
use session_api_client::{ApiClient, ApiRequest, ClientConfig, RefreshMode};
use std::path::PathBuf;
use std::time::Duration;

/// Persisted API session from the command line
#[derive(Parser, Debug)]
#[command(name = "session-cli")]
#[command(about = "Log in, inspect the cached session and call the API")]
struct Args {
    /// API base URL
    #[arg(long, env = "SESSION_API_BASE_URL")]
    base_url: String,

    /// Session file (defaults to the platform data directory)
    #[arg(long, env = "SESSION_API_STORAGE")]
    storage: Option<PathBuf>,

    /// Give every failing request its own refresh exchange
    #[arg(long)]
    per_request_refresh: bool,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and cache the session
    Login {
        /// Account email
        #[arg(long, short = 'e')]
        email: String,

        /// Account password
        #[arg(long, short = 'p', env = "SESSION_API_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the cached session
    Status {
        /// Fetch the profile from the server instead of the cache
        #[arg(long)]
        remote: bool,
    },
    /// Send an authenticated GET and print the JSON body
    Get {
        /// Path relative to the base URL, e.g. `/content/42`
        path: String,
    },
    /// Log out and clear the cached session
    Logout,
}

fn build_client(args: &Args) -> anyhow::Result<ApiClient> {
    let refresh_mode = if args.per_request_refresh {
        RefreshMode::PerRequest
    } else {
        RefreshMode::SingleFlight
    };

    let mut config = ClientConfig::builder()
        .base_url(args.base_url.clone())
        .refresh_mode(refresh_mode)
        .request_timeout(Duration::from_secs(args.timeout))
        .build();
    if let Some(ref path) = args.storage {
        config.storage_path = path.clone();
    }

    let client = ApiClient::create(config).context("Invalid client configuration")?;
    client.hydrate().context("Failed to read the cached session")?;
    Ok(client)
}

/// Split `/content?limit=5&page=2` into a path and query pairs
fn parse_target(target: &str) -> ApiRequest {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .fold(ApiRequest::get(path), |request, (key, value)| {
            request.with_query(key, value)
        })
}

async fn login(client: &ApiClient, email: String, password: String) -> anyhow::Result<()> {
    let profile = client
        .auth()
        .login(&Credentials::new(email, password))
        .await
        .context("Login failed")?;

    println!("✓ Logged in");
    println!("{}", serde_json::to_string_pretty(profile.as_value())?);
    println!();
    println!("Session cached at {}", client.config().storage_path.display());
    Ok(())
}

async fn status(client: &ApiClient, remote: bool) -> anyhow::Result<()> {
    let session = client.session();
    if session.access_token().is_none() {
        println!("✗ Not logged in");
        return Ok(());
    }

    let profile = if remote {
        Some(client.auth().load_profile().await?)
    } else {
        session.profile()
    };

    if client.is_authenticated() {
        println!("✓ Authenticated");
    } else {
        println!("• Token cached, no profile");
    }
    println!(
        "  Refresh token: {}",
        if session.refresh_token().is_some() {
            "present"
        } else {
            "absent"
        }
    );
    if let Some(profile) = profile {
        println!("{}", serde_json::to_string_pretty(profile.as_value())?);
    }
    Ok(())
}

async fn get(client: &ApiClient, target: &str) -> anyhow::Result<()> {
    let response = client.execute(&parse_target(target)).await?;
    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("{}", response.body),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_api_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = build_client(&args)?;

    let result = match args.command {
        Command::Login { email, password } => login(&client, email, password).await,
        Command::Status { remote } => status(&client, remote).await,
        Command::Get { ref path } => get(&client, path).await,
        Command::Logout => {
            client.logout().await?;
            println!("✓ Logged out");
            Ok(())
        }
    };

    client.dispose().await;
    if let Err(ref e) = result {
        tracing::debug!(error = %e, "Command failed");
    }
    result
}
