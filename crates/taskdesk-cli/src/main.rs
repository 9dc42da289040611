//! taskdesk - a terminal client for the taskdesk task and project service.
//!
//! Log in once and the session tokens are kept in the OS keychain (or a token
//! file); list commands refresh an expired session transparently.

mod prompt;
mod render;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use taskdesk_core::auth::{AuthManager, Credentials};
use taskdesk_core::utils::format_expiry;
use taskdesk_core::{ApiError, Config, SessionEvent};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "taskdesk", version, about = "Tasks and projects from the terminal")]
struct Cli {
    /// Base URL of the task service API (overrides config and TASKDESK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print lists as JSON instead of cards
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session tokens
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and log into it
    Register,
    /// End the session and forget the stored tokens
    Logout,
    /// Show who is logged in
    Whoami,
    /// List your tasks
    Tasks,
    /// List your projects
    Projects,
    /// Projects and tasks together
    Dashboard,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .context("--log-file must name a file")?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

fn load_config(api_url: Option<String>) -> Result<Config> {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            let mut config = Config::default();
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
    };
    if let Some(url) = api_url {
        config.api_url = Some(url);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;
    info!("taskdesk starting");

    let mut config = load_config(cli.api_url)?;
    let client = config.session_client()?;
    let mut events = client.subscribe();
    let manager = AuthManager::new(client);
    let _watcher = manager.watch_session_events();

    let result = run(cli.command, &mut config, &manager, cli.json).await;
    print_session_events(&mut events);
    result
}

async fn run(
    command: Command,
    config: &mut Config,
    manager: &AuthManager,
    json: bool,
) -> Result<()> {
    match command {
        Command::Login { email } => login(config, manager, email).await,
        Command::Register => {
            let registration = prompt::registration()?;
            println!("Registering...");
            let state = manager.register(&registration).await.map_err(report)?;
            config.last_email = Some(registration.email);
            save_config(config);
            println!("Account created. {}", render::welcome(&state));
            Ok(())
        }
        Command::Logout => {
            manager.logout().await.map_err(report)?;
            println!("Logged out.");
            Ok(())
        }
        Command::Whoami => {
            whoami(manager);
            Ok(())
        }
        Command::Tasks => {
            require_session(manager)?;
            let page = manager.client().fetch_tasks().await.map_err(load_error)?;
            render::print_tasks(&page, json)
        }
        Command::Projects => {
            require_session(manager)?;
            let page = manager.client().fetch_projects().await.map_err(load_error)?;
            render::print_projects(&page, json)
        }
        Command::Dashboard => {
            require_session(manager)?;
            let dashboard = manager.client().fetch_dashboard().await.map_err(load_error)?;
            render::print_dashboard(&dashboard, json)
        }
    }
}

async fn login(config: &mut Config, manager: &AuthManager, email: Option<String>) -> Result<()> {
    let default_email = email.or_else(|| config.last_email.clone());
    let email = prompt::email(default_email.as_deref())?;
    let password = prompt::password("Password: ")?;

    println!("Authenticating...");
    let state = manager
        .login(&Credentials::new(email.clone(), password))
        .await
        .map_err(report)?;

    config.last_email = Some(email);
    save_config(config);
    println!("{}", render::welcome(&state));
    Ok(())
}

fn whoami(manager: &AuthManager) {
    match manager.state().identity {
        Some(identity) => {
            println!("{}", identity.display_name());
            if let Some(ref email) = identity.email {
                println!("Email: {}", email);
            }
            if let Some(remaining) = identity.time_until_expiry() {
                println!("Access token {}", format_expiry(remaining));
            }
        }
        None => println!("Not logged in."),
    }
}

fn require_session(manager: &AuthManager) -> Result<()> {
    if manager.is_authenticated() {
        Ok(())
    } else {
        anyhow::bail!("Please log in to access this command (taskdesk login)")
    }
}

fn save_config(config: &Config) {
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

/// Error for a rejected session operation, shown as its inline message.
fn report(err: ApiError) -> anyhow::Error {
    debug!(error = ?err, kind = ?err.kind(), "Operation rejected");
    anyhow::anyhow!(err.user_message())
}

fn load_error(err: ApiError) -> anyhow::Error {
    anyhow::Error::new(err).context("Failed to load data")
}

/// Print notifications published while the command ran. Repeats of the same
/// network notice (concurrent requests failing together) print once.
fn print_session_events(events: &mut broadcast::Receiver<SessionEvent>) {
    let mut last_notice: Option<String> = None;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::NetworkError(notice) => {
                if last_notice.as_deref() != Some(notice.as_str()) {
                    render::notice(&notice);
                    last_notice = Some(notice);
                }
            }
            SessionEvent::LoginRequired => {
                render::notice("Your session has ended. Run `taskdesk login` to sign in again.");
            }
            SessionEvent::TokensRefreshed => debug!("Session refreshed"),
        }
    }
}
