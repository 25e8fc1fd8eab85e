//! listeden - command-line client for the listeden shopping list service.
//!
//! Plays the part of the app's login/register screens: it collects
//! credentials, drives the session controller from `listeden-core`, and
//! reports the outcome.

use std::io::{self, Write};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use listeden_core::auth::{SessionController, SessionError};
use listeden_core::config::{Config, TokenBackend};
use listeden_core::models::{AuthResult, Credential, Registration};

/// Environment variable holding the password, for non-interactive use
const ENV_SECRET: &str = "LISTEDEN_SECRET";

#[derive(Debug, Parser)]
#[command(name = "listeden", version, about = "Log in to listeden and make authenticated requests")]
struct Cli {
    /// Backend base URL, e.g. http://localhost:8080
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where the session token is kept: file, keyring or memory
    #[arg(long, global = true)]
    store: Option<TokenBackend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show whether a session token is stored
    Status,
    /// Log in with an email or username
    Login {
        #[arg(long)]
        identifier: Option<String>,
    },
    /// Create an account and log in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Forget the stored session token
    Logout,
    /// GET an API path with the current session and print the JSON body
    Get { path: String },
}

/// Initialize the tracing subscriber for logging
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

    let cli = Cli::parse();
    let _guard = init_tracing();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    config.apply_env()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = Some(url);
    }
    if let Some(store) = cli.store {
        config.token_backend = store;
    }

    let session = config.build_session()?;
    info!(api = config.base_url(), store = %config.token_backend, "listeden starting");

    match cli.command {
        Command::Status => status(&session, &config).await,
        Command::Login { identifier } => {
            let identifier = match identifier.or_else(|| config.last_identifier.clone()) {
                Some(identifier) => identifier,
                None => prompt("Email or username: ")?,
            };
            login(&session, identifier).await
        }
        Command::Register {
            username,
            email,
            first_name,
            last_name,
        } => {
            let registration = Registration::new(username, email, read_secret(true)?)
                .with_name(first_name, last_name);
            register(&session, registration).await
        }
        Command::Logout => {
            session.logout().await?;
            println!("Logged out");
            Ok(())
        }
        Command::Get { path } => {
            let body: serde_json::Value = session.client().get_json(&path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
    }
}

async fn status(session: &SessionController, config: &Config) -> Result<()> {
    let state = session.current_state().await;
    if state.is_authenticated() {
        println!("Logged in ({} store, {})", config.token_backend, config.base_url());
    } else {
        println!("Not logged in ({} store, {})", config.token_backend, config.base_url());
    }
    Ok(())
}

async fn login(session: &SessionController, identifier: String) -> Result<()> {
    let identifier = identifier.trim().to_string();
    let secret = read_secret(false)?;
    if identifier.is_empty() || secret.is_empty() {
        bail!("Email/username and password required");
    }

    ensure_logged_out(session).await?;
    println!("Logging in...");
    report(session.submit(Credential::new(identifier.clone(), secret)).await)?;
    remember_identifier(identifier);
    Ok(())
}

async fn register(session: &SessionController, registration: Registration) -> Result<()> {
    if registration.username.trim().is_empty() || registration.email.trim().is_empty() {
        bail!("Username and email required");
    }
    if registration.secret.is_empty() {
        bail!("Password required");
    }

    ensure_logged_out(session).await?;
    let email = registration.email.clone();
    println!("Creating account...");
    report(session.submit(registration).await)?;
    remember_identifier(email);
    Ok(())
}

async fn ensure_logged_out(session: &SessionController) -> Result<()> {
    if session.current_state().await.is_authenticated() {
        bail!("Already logged in; run `listeden logout` first");
    }
    Ok(())
}

/// Turn a submit outcome into user-facing output.
fn report(outcome: Result<AuthResult, SessionError>) -> Result<()> {
    match outcome {
        Ok(AuthResult::Success {
            message, username, ..
        }) => {
            match (message.is_empty(), username) {
                (false, _) => println!("{}", message),
                (true, Some(name)) => println!("Logged in as {}", name),
                (true, None) => println!("Logged in"),
            }
            Ok(())
        }
        Ok(AuthResult::Error { message, code }) => match code {
            Some(code) => bail!("{} (HTTP {})", message, code),
            None => bail!("{}", message),
        },
        Ok(AuthResult::Loading) => bail!("Authentication did not complete"),
        Err(SessionError::Persist(e)) => {
            // The session only lived in this process
            eprintln!("Warning: logged in, but the session could not be saved: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Save the identifier for next time, without persisting env or flag overrides
fn remember_identifier(identifier: String) {
    let mut stored = Config::load().unwrap_or_default();
    stored.last_identifier = Some(identifier);
    if let Err(e) = stored.save() {
        warn!(error = %e, "Failed to save config");
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn read_secret(confirm: bool) -> Result<String> {
    if let Ok(secret) = std::env::var(ENV_SECRET) {
        return Ok(secret);
    }

    let secret = rpassword::prompt_password("Password: ")?;
    if confirm && rpassword::prompt_password("Confirm password: ")? != secret {
        bail!("Passwords do not match");
    }
    Ok(secret)
}
