//! envmon - command-line client for the environmental monitoring backend.
//!
//! Signs in against the backend, keeps the session token between runs,
//! and issues authenticated requests the same way the admin console does.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use envmon_core::auth::AuthPhase;
use envmon_core::routing::GuardDecision;
use envmon_core::{App, Config};

/// Environment variable consulted before prompting for a password
const PASSWORD_ENV: &str = "ENVMON_PASSWORD";

#[derive(Parser)]
#[command(name = "envmon", version, about = "Environmental monitoring admin client")]
struct Cli {
    /// Config file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding config and environment
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Change the signed-in user's password
    Passwd,
    /// Show whether a console route would render for the current session
    Route { path: String },
    /// Authenticated GET against a backend path, printing the JSON response
    Get { path: String },
}

/// Initialize the tracing subscriber for logging.
/// Returns the file writer guard, which must live as long as logging does.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "envmon.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
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

    guard
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.config.is_some() {
        config.apply_env_overrides();
    }
    if let Some(ref url) = cli.base_url {
        config.base_url = url.clone();
    }
    Ok(config)
}

fn save_config(cli: &Cli, config: &Config) -> Result<()> {
    match cli.config {
        Some(ref path) => config.save_to(path),
        None => config.save(),
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

/// Tell the user about sessions the server ended while a command ran.
fn report_redirects(app: &mut App) {
    for target in app.take_redirects() {
        eprintln!("Session ended by server; redirected to {}", target);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    let _log_guard = init_tracing(config.log_dir.as_ref());
    info!("envmon starting");

    let mut app = App::new(config.clone())?;

    match cli.command {
        Command::Login { ref username } => {
            let username = match username.clone().or_else(|| config.last_username.clone()) {
                Some(u) => u,
                None => prompt_line("Username: ")?,
            };
            let password = match std::env::var(PASSWORD_ENV) {
                Ok(p) if !p.is_empty() => p,
                _ => prompt_password(&format!("Password for {}: ", username))?,
            };

            let identity = app.auth().login(&username, &password).await?;
            println!("Signed in as {} ({})", identity.username, identity.role);

            config.last_username = Some(username);
            save_config(&cli, &config)?;
        }
        Command::Logout => {
            app.auth().logout();
            println!("Signed out");
        }
        Command::Whoami => {
            let phase = app.auth().initialize().await;
            report_redirects(&mut app);
            match (phase, app.auth().snapshot().identity) {
                (AuthPhase::Authenticated, Some(identity)) => {
                    println!("{} ({})", identity.username, identity.role);
                }
                _ => println!("Not signed in"),
            }
        }
        Command::Passwd => {
            let phase = app.auth().initialize().await;
            report_redirects(&mut app);
            if phase != AuthPhase::Authenticated {
                bail!("Not signed in - run `envmon login` first");
            }
            let old = prompt_password("Current password: ")?;
            let new = prompt_password("New password: ")?;
            let confirm = prompt_password("Repeat new password: ")?;
            if new != confirm {
                bail!("Passwords do not match");
            }

            let old = (!old.is_empty()).then_some(old);
            let result = app.auth().change_password(&new, old.as_deref()).await;
            report_redirects(&mut app);
            let message = result?;
            println!("{}", message.unwrap_or_else(|| "Password changed".to_string()));
        }
        Command::Route { ref path } => {
            let mut guard = app.route_guard();
            guard.navigate(path);
            app.auth().initialize().await;
            report_redirects(&mut app);
            match guard.reevaluate() {
                GuardDecision::Allow => println!("{}: allowed", path),
                GuardDecision::Loading => println!("{}: session still loading", path),
                GuardDecision::Redirect(to) => println!("{}: redirected to {}", path, to),
            }
        }
        Command::Get { ref path } => {
            app.auth().initialize().await;
            let result = app.transport().get_json::<serde_json::Value>(path).await;
            report_redirects(&mut app);
            let value = result.with_context(|| format!("GET {} failed", path))?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    info!("envmon finished");
    Ok(())
}
