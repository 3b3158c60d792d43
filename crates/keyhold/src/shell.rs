// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keyhold shell` command implementation.
//!
//! Interactive REPL hosting one session with the idle timer running. Every
//! line entered counts as activity. Lock notifications from the session are
//! printed as they arrive.

use std::time::Duration;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use secrecy::ExposeSecret;
use tracing::debug;

use keyhold_core::types::{LoginRecord, NoteRecord};
use keyhold_core::{Item, ItemIdentifier, KeyholdError, Record, SessionState};
use keyhold_session::SessionMachine;

use crate::prompt;

const HELP: &str = "\
commands:
  /unlock                          unlock with the master password
  /lock                            lock now
  /list                            list items
  /add-login <vault> <name> <username> [url]
  /add-note <vault> <name> <text...>
  /rm <n>                          delete item n from the last /list
  /sync                            pull items from the server
  /vaults                          list vaults
  /vault-add <name>                create a vault
  /vault-rename <id> <name>        rename a vault
  /vault-rm <id>                   delete a vault and its items
  /autolock on [secs] | off        change idle auto-lock
  /passwd                          change the master password
  /logout                          log out and purge local data
  /quit                            leave the shell";

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    Unlock,
    Lock,
    List,
    AddLogin {
        vault_id: i64,
        name: String,
        username: String,
        url: Option<String>,
    },
    AddNote {
        vault_id: i64,
        name: String,
        body: String,
    },
    Remove(usize),
    Sync,
    Vaults,
    VaultAdd(String),
    VaultRename(i64, String),
    VaultRemove(i64),
    AutoLock {
        enabled: bool,
        timeout: Option<Duration>,
    },
    Passwd,
    Logout,
    Quit,
}

/// Parse one input line. Errors are user-facing usage messages.
pub fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let rest: Vec<&str> = words.collect();

    let vault_arg = |index: usize| -> Result<i64, String> {
        rest.get(index)
            .ok_or_else(|| "missing vault id".to_string())?
            .parse()
            .map_err(|_| format!("invalid vault id: {}", rest[index]))
    };

    match head {
        "/help" | "/?" => Ok(ShellCommand::Help),
        "/unlock" => Ok(ShellCommand::Unlock),
        "/lock" => Ok(ShellCommand::Lock),
        "/list" | "/ls" => Ok(ShellCommand::List),
        "/add-login" => {
            if rest.len() < 3 {
                return Err("usage: /add-login <vault> <name> <username> [url]".to_string());
            }
            Ok(ShellCommand::AddLogin {
                vault_id: vault_arg(0)?,
                name: rest[1].to_string(),
                username: rest[2].to_string(),
                url: rest.get(3).map(|s| s.to_string()),
            })
        }
        "/add-note" => {
            if rest.len() < 3 {
                return Err("usage: /add-note <vault> <name> <text...>".to_string());
            }
            Ok(ShellCommand::AddNote {
                vault_id: vault_arg(0)?,
                name: rest[1].to_string(),
                body: rest[2..].join(" "),
            })
        }
        "/rm" => {
            let index = rest
                .first()
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| "usage: /rm <n>".to_string())?;
            Ok(ShellCommand::Remove(index))
        }
        "/sync" => Ok(ShellCommand::Sync),
        "/vaults" => Ok(ShellCommand::Vaults),
        "/vault-add" if !rest.is_empty() => Ok(ShellCommand::VaultAdd(rest.join(" "))),
        "/vault-rename" if rest.len() >= 2 => {
            Ok(ShellCommand::VaultRename(vault_arg(0)?, rest[1..].join(" ")))
        }
        "/vault-rm" if rest.len() == 1 => Ok(ShellCommand::VaultRemove(vault_arg(0)?)),
        "/autolock" => match rest.as_slice() {
            ["off"] => Ok(ShellCommand::AutoLock {
                enabled: false,
                timeout: None,
            }),
            ["on"] => Ok(ShellCommand::AutoLock {
                enabled: true,
                timeout: None,
            }),
            ["on", secs] => {
                let secs: u64 = secs
                    .parse()
                    .map_err(|_| format!("invalid timeout: {secs}"))?;
                Ok(ShellCommand::AutoLock {
                    enabled: true,
                    timeout: Some(Duration::from_secs(secs)),
                })
            }
            _ => Err("usage: /autolock on [secs] | off".to_string()),
        },
        "/passwd" => Ok(ShellCommand::Passwd),
        "/logout" => Ok(ShellCommand::Logout),
        "/quit" | "/exit" => Ok(ShellCommand::Quit),
        "/vault-add" | "/vault-rename" | "/vault-rm" => {
            Err(format!("missing arguments for {head}; see /help"))
        }
        other => Err(format!("unknown command: {other} (try /help)")),
    }
}

/// One line per item for `/list`.
pub fn describe(index: usize, item: &Item) -> String {
    match &item.record {
        Record::Login(login) => {
            let url = login.url.as_deref().unwrap_or("-");
            format!(
                "{index:>3}. {} [login] {} @ {url} (vault {})",
                login.name, login.username, item.vault_id
            )
        }
        Record::Note(note) => format!(
            "{index:>3}. {} [note] (vault {})",
            note.name, item.vault_id
        ),
    }
}

/// Runs the `keyhold shell` interactive REPL.
pub async fn run_shell(session: SessionMachine) -> Result<(), KeyholdError> {
    let state = session.restore().await?;
    if state == SessionState::NoSession {
        println!("not logged in; run `keyhold login <email>` first");
        return Ok(());
    }

    // Surface auto-locks while the prompt is waiting.
    let (observer, mut updates) = session.subscribe();
    let notifier = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let locked = {
                let update = updates.borrow_and_update();
                update.is_locked && update.shell.is_some()
            };
            if locked {
                eprintln!("\n{}", "vault locked".yellow());
            }
        }
    });

    let mut rl = DefaultEditor::new()
        .map_err(|e| KeyholdError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "keyhold shell".bold().green());
    println!("Type {} for commands, {} to exit.\n", "/help".yellow(), "/quit".yellow());
    if state == SessionState::Locked {
        println!("vault is locked; use {}", "/unlock".yellow());
    }

    let mut listing: Vec<ItemIdentifier> = Vec::new();
    loop {
        let prompt = match session.state().await {
            SessionState::Unlocked => format!("{}> ", "keyhold".green()),
            SessionState::Locked => format!("{}> ", "keyhold (locked)".yellow()),
            SessionState::NoSession => break,
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);
                session.touch().await;

                let command = match parse_command(trimmed) {
                    Ok(command) => command,
                    Err(usage) => {
                        eprintln!("{}", usage.yellow());
                        continue;
                    }
                };
                if command == ShellCommand::Quit {
                    break;
                }
                if let Err(e) = execute(&session, command, &mut listing).await {
                    eprintln!("{}: {e}", "error".red());
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    session.unsubscribe(&observer);
    notifier.abort();
    Ok(())
}

async fn execute(
    session: &SessionMachine,
    command: ShellCommand,
    listing: &mut Vec<ItemIdentifier>,
) -> Result<(), KeyholdError> {
    debug!(?command, "shell command");
    match command {
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Unlock => {
            let password = prompt::master_password("Master password: ")?;
            session.unlock(&password).await?;
            println!("{}", "unlocked".green());
        }
        ShellCommand::Lock => {
            session.lock().await?;
        }
        ShellCommand::List => {
            listing.clear();
            for result in session.items().await? {
                match result {
                    Ok(item) => {
                        println!("{}", describe(listing.len() + 1, &item));
                        listing.push(item.uuid);
                    }
                    Err(e) => println!("{}", format!("  ! {e}").red()),
                }
            }
            if listing.is_empty() {
                println!("{}", "no items".dimmed());
            }
        }
        ShellCommand::AddLogin {
            vault_id,
            name,
            username,
            url,
        } => {
            let password = prompt::secret("Item password: ")?;
            let item = Item::new(
                vault_id,
                Record::Login(LoginRecord {
                    name,
                    username,
                    password: password.expose_secret().to_string(),
                    url,
                    notes: None,
                }),
            );
            let saved = session.save_item(item).await?;
            println!("saved {}", saved.record.name());
        }
        ShellCommand::AddNote {
            vault_id,
            name,
            body,
        } => {
            let saved = session
                .save_item(Item::new(vault_id, Record::Note(NoteRecord { name, body })))
                .await?;
            println!("saved {}", saved.record.name());
        }
        ShellCommand::Remove(index) => {
            let Some(id) = listing.get(index - 1) else {
                eprintln!("{}", "no such item; run /list first".yellow());
                return Ok(());
            };
            if session.delete_item(id).await? {
                println!("deleted");
            } else {
                println!("item already gone");
            }
            listing.clear();
        }
        ShellCommand::Sync => {
            let count = session.sync().await?;
            listing.clear();
            println!("{count} items");
        }
        ShellCommand::Vaults => {
            if let Some(shell) = session.shell().await {
                for vault in shell.vaults {
                    println!("{:>4}  {}", vault.id, vault.name);
                }
            }
        }
        ShellCommand::VaultAdd(name) => {
            let vault = session.create_vault(&name, None).await?;
            println!("created vault {} ({})", vault.id, vault.name);
        }
        ShellCommand::VaultRename(id, name) => {
            let vault = session.rename_vault(id, &name).await?;
            println!("renamed vault {} to {}", vault.id, vault.name);
        }
        ShellCommand::VaultRemove(id) => {
            session.delete_vault(id).await?;
            listing.clear();
            println!("deleted vault {id}");
        }
        ShellCommand::AutoLock { enabled, timeout } => {
            session.set_auto_lock(enabled, timeout).await?;
            let (enabled, timeout) = session.auto_lock().await;
            if enabled {
                println!("auto-lock after {}s idle", timeout.as_secs());
            } else {
                println!("auto-lock off");
            }
        }
        ShellCommand::Passwd => {
            let current = prompt::secret("Current master password: ")?;
            let new = prompt::new_master_password("New master password: ")?;
            session.change_master_password(&current, &new).await?;
            println!("{}", "master password changed".green());
        }
        ShellCommand::Logout => {
            session.logout().await?;
            println!("logged out");
        }
        ShellCommand::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("/lock"), Ok(ShellCommand::Lock));
        assert_eq!(parse_command("  /ls "), Ok(ShellCommand::List));
        assert_eq!(parse_command("/exit"), Ok(ShellCommand::Quit));
    }

    #[test]
    fn parses_add_login_with_optional_url() {
        assert_eq!(
            parse_command("/add-login 1 mail ada https://mail.example"),
            Ok(ShellCommand::AddLogin {
                vault_id: 1,
                name: "mail".to_string(),
                username: "ada".to_string(),
                url: Some("https://mail.example".to_string()),
            })
        );
        assert!(parse_command("/add-login 1 mail").is_err());
        assert!(parse_command("/add-login x mail ada").is_err());
    }

    #[test]
    fn note_body_keeps_spaces_between_words() {
        assert_eq!(
            parse_command("/add-note 2 wifi the password is on the fridge"),
            Ok(ShellCommand::AddNote {
                vault_id: 2,
                name: "wifi".to_string(),
                body: "the password is on the fridge".to_string(),
            })
        );
    }

    #[test]
    fn remove_needs_positive_index() {
        assert_eq!(parse_command("/rm 3"), Ok(ShellCommand::Remove(3)));
        assert!(parse_command("/rm 0").is_err());
        assert!(parse_command("/rm").is_err());
    }

    #[test]
    fn autolock_variants() {
        assert_eq!(
            parse_command("/autolock off"),
            Ok(ShellCommand::AutoLock {
                enabled: false,
                timeout: None
            })
        );
        assert_eq!(
            parse_command("/autolock on 120"),
            Ok(ShellCommand::AutoLock {
                enabled: true,
                timeout: Some(Duration::from_secs(120))
            })
        );
        assert!(parse_command("/autolock maybe").is_err());
    }

    #[test]
    fn vault_commands() {
        assert_eq!(
            parse_command("/vault-rename 4 Side projects"),
            Ok(ShellCommand::VaultRename(4, "Side projects".to_string()))
        );
        assert!(parse_command("/vault-rm").is_err());
        assert!(parse_command("/frobnicate").is_err());
    }

    #[test]
    fn describe_login_and_note() {
        let login = Item::new(
            1,
            Record::Login(LoginRecord {
                name: "mail".to_string(),
                username: "ada".to_string(),
                password: "pw".to_string(),
                url: None,
                notes: None,
            }),
        );
        let line = describe(1, &login);
        assert!(line.contains("mail [login] ada @ -"));
        assert!(!line.contains("pw"));

        let note = Item::new(
            2,
            Record::Note(NoteRecord {
                name: "wifi".to_string(),
                body: "secret".to_string(),
            }),
        );
        assert!(!describe(2, &note).contains("secret"));
    }
}
