// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master password acquisition via TTY prompt or KEYHOLD_MASTER_PASSWORD.

use keyhold_core::KeyholdError;
use secrecy::SecretString;

/// The environment variable name for providing the master password.
pub const MASTER_PASSWORD_ENV_VAR: &str = "KEYHOLD_MASTER_PASSWORD";

/// Get the master password from the environment or an interactive prompt.
///
/// Priority:
/// 1. `KEYHOLD_MASTER_PASSWORD` environment variable (for scripting)
/// 2. Interactive TTY prompt via `rpassword`
pub fn master_password(label: &str) -> Result<SecretString, KeyholdError> {
    if let Some(password) = from_env() {
        return Ok(password);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let password = read(label)?;
        if password.is_empty() {
            return Err(KeyholdError::Config(
                "empty master password not allowed".to_string(),
            ));
        }
        return Ok(SecretString::from(password));
    }

    Err(no_password())
}

/// Get a new master password, prompting twice when interactive.
pub fn new_master_password(label: &str) -> Result<SecretString, KeyholdError> {
    if let Some(password) = from_env() {
        return Ok(password);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let first = read(label)?;
        let second = read("Confirm master password: ")?;
        if first != second {
            return Err(KeyholdError::Config("passwords do not match".to_string()));
        }
        if first.is_empty() {
            return Err(KeyholdError::Config(
                "empty master password not allowed".to_string(),
            ));
        }
        return Ok(SecretString::from(first));
    }

    Err(no_password())
}

/// Plain secret prompt without the environment fallback (item passwords).
pub fn secret(label: &str) -> Result<SecretString, KeyholdError> {
    read(label).map(SecretString::from)
}

fn from_env() -> Option<SecretString> {
    std::env::var(MASTER_PASSWORD_ENV_VAR)
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}

fn read(label: &str) -> Result<String, KeyholdError> {
    eprint!("{label}");
    rpassword::read_password()
        .map_err(|e| KeyholdError::Internal(format!("failed to read password: {e}")))
}

fn no_password() -> KeyholdError {
    KeyholdError::Config(format!(
        "no master password provided; set {MASTER_PASSWORD_ENV_VAR} or run interactively"
    ))
}
