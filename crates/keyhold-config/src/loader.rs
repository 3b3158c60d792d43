// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./keyhold.toml` > `~/.config/keyhold/keyhold.toml` > `/etc/keyhold/keyhold.toml`
//! with environment variable overrides via `KEYHOLD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KeyholdConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/keyhold/keyhold.toml`
/// 3. `~/.config/keyhold/keyhold.toml`
/// 4. `./keyhold.toml`
/// 5. `KEYHOLD_*` environment variables
pub fn load_config() -> Result<KeyholdConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<KeyholdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeyholdConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeyholdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeyholdConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config files in merge order; later files override earlier ones.
pub fn config_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/keyhold/keyhold.toml")];
    files.extend(dirs::config_dir().map(|d| d.join("keyhold/keyhold.toml")));
    files.push(PathBuf::from("keyhold.toml"));
    files
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    config_files()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(KeyholdConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Environment provider mapping `KEYHOLD_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `KEYHOLD_SESSION_IDLE_TIMEOUT_SECS` must map to
/// `session.idle_timeout_secs`.
fn env_provider() -> Env {
    Env::prefixed("KEYHOLD_")
        .ignore(&["MASTER_PASSWORD"])
        .map(|key| {
            let key_str = key.as_str();
            let mapped = ["client", "kdf", "session", "handoff", "storage", "remote"]
                .iter()
                .find_map(|section| {
                    key_str
                        .strip_prefix(&format!("{section}_"))
                        .map(|rest| format!("{section}.{rest}"))
                })
                .unwrap_or_else(|| key_str.to_string());
            mapped.into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KEYHOLD_SESSION_IDLE_TIMEOUT_SECS", "120");
            jail.set_env("KEYHOLD_HANDOFF_TTL_SECS", "30");
            let config: KeyholdConfig = Figment::new()
                .merge(Serialized::defaults(KeyholdConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.session.idle_timeout_secs, 120);
            assert_eq!(config.handoff.ttl_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn diagnostic_env_names_reach_the_loader() {
        figment::Jail::expect_with(|jail| {
            let name = crate::diagnostic::env_var_for("remote.timeout_secs");
            jail.set_env(&name, "7");
            let config: KeyholdConfig = Figment::new()
                .merge(Serialized::defaults(KeyholdConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.remote.timeout_secs, 7);
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_user_and_system_files() {
        let files = config_files();
        assert_eq!(files.first(), Some(&PathBuf::from("/etc/keyhold/keyhold.toml")));
        assert_eq!(files.last(), Some(&PathBuf::from("keyhold.toml")));
    }

    #[test]
    fn master_password_env_is_not_config() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KEYHOLD_MASTER_PASSWORD", "hunter2");
            let config: KeyholdConfig = Figment::new()
                .merge(Serialized::defaults(KeyholdConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.client.log_level, "info");
            Ok(())
        });
    }
}
