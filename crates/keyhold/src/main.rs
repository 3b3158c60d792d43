// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyhold - a zero-knowledge password vault client.
//!
//! This is the binary entry point for the Keyhold CLI.

mod prompt;
mod shell;
mod status;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use keyhold_config::KeyholdConfig;
use keyhold_core::KeyholdError;
use keyhold_remote::RemoteClient;
use keyhold_session::SessionMachine;
use keyhold_storage::{RuntimeDirVolatileStore, SqliteDurableStore};

/// Keyhold - a zero-knowledge password vault client.
#[derive(Parser, Debug)]
#[command(name = "keyhold", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account on the vault server and log in.
    Register {
        /// Account email address.
        email: String,
    },
    /// Log in to an existing account.
    Login {
        /// Account email address.
        email: String,
    },
    /// Show session and server status.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Log out and purge all local data.
    Logout,
    /// Launch an interactive session shell.
    Shell,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match keyhold_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            keyhold_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.client.log_level);

    if let Err(e) = run(cli, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: KeyholdConfig) -> Result<(), KeyholdError> {
    let Some(command) = cli.command else {
        println!("keyhold: use --help for available commands");
        return Ok(());
    };

    let (session, remote) = open_session(&config).await?;

    match command {
        Commands::Register { email } => {
            let password = prompt::new_master_password("Master password: ")?;
            session.register(&email, &password).await?;
            println!("registered and logged in as {email}");
        }
        Commands::Login { email } => {
            let password = prompt::master_password("Master password: ")?;
            session.login(&email, &password).await?;
            println!("logged in as {email}");
        }
        Commands::Status { json, plain } => {
            status::run_status(&config, &session, remote.as_ref(), json, plain).await?;
        }
        Commands::Logout => {
            session.restore().await?;
            session.logout().await?;
            println!("logged out");
        }
        Commands::Shell => {
            shell::run_shell(session).await?;
        }
    }
    Ok(())
}

/// Wire the on-disk stores and the vault server client into a session.
async fn open_session(
    config: &KeyholdConfig,
) -> Result<(SessionMachine, Arc<RemoteClient>), KeyholdError> {
    let durable = Arc::new(SqliteDurableStore::open(&config.storage).await?);
    let volatile = Arc::new(RuntimeDirVolatileStore::from_config(
        config.storage.volatile_dir.as_deref(),
    )?);
    let remote = Arc::new(RemoteClient::new(&config.remote)?);

    let session = SessionMachine::new(config, remote.clone(), durable, volatile);
    Ok((session, remote))
}

/// Initialize the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keyhold={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
