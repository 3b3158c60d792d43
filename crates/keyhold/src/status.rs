// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keyhold status` command implementation.
//!
//! Restores the stored session (without unlocking it) and reports who is
//! logged in, how many encrypted items are cached, the auto-lock policy and
//! whether the vault server answers its health check.

use std::io::IsTerminal;

use keyhold_config::KeyholdConfig;
use keyhold_core::{HealthStatus, KeyholdError, RemoteStore, SessionState, StoreAdapter};
use keyhold_session::SessionMachine;
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: SessionState,
    pub email: Option<String>,
    pub vaults: usize,
    pub items: usize,
    pub auto_lock: bool,
    pub idle_timeout_secs: u64,
    pub remote_url: String,
    pub remote_reachable: bool,
}

/// Run the `keyhold status` command.
pub async fn run_status(
    config: &KeyholdConfig,
    session: &SessionMachine,
    remote: &dyn RemoteStore,
    json: bool,
    plain: bool,
) -> Result<(), KeyholdError> {
    let state = session.restore().await?;
    let shell = session.shell().await;
    let (auto_lock, idle_timeout) = session.auto_lock().await;
    let remote_reachable = matches!(remote.health_check().await, Ok(HealthStatus::Healthy));

    let status = StatusResponse {
        state,
        email: shell.as_ref().map(|s| s.email.clone()),
        vaults: shell.as_ref().map_or(0, |s| s.vaults.len()),
        items: session.item_count().await,
        auto_lock,
        idle_timeout_secs: idle_timeout.as_secs(),
        remote_url: config.remote.base_url.clone(),
        remote_reachable,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status, use_color);
    }
    Ok(())
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::NoSession => "not logged in",
        SessionState::Locked => "locked",
        SessionState::Unlocked => "unlocked",
    }
}

fn print_status(status: &StatusResponse, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  keyhold status");
    println!("  {}", "-".repeat(35));

    let label = state_label(status.state);
    if use_color {
        let painted = match status.state {
            SessionState::Unlocked => label.green(),
            SessionState::Locked => label.yellow(),
            SessionState::NoSession => label.dimmed(),
        };
        println!("    State:    {painted}");
    } else {
        println!("    State:    {label}");
    }

    if let Some(email) = &status.email {
        println!("    Account:  {email}");
        println!("    Vaults:   {}", status.vaults);
        println!("    Items:    {}", status.items);
    }

    if status.auto_lock {
        println!("    Auto-lock: after {}s idle", status.idle_timeout_secs);
    } else {
        println!("    Auto-lock: off");
    }

    let reachable = if status.remote_reachable {
        "reachable"
    } else {
        "unreachable"
    };
    println!("    Server:   {} ({reachable})", status.remote_url);
    println!();

    if status.state == SessionState::NoSession {
        println!("  Log in with: keyhold login <email>");
        println!();
    }
}
