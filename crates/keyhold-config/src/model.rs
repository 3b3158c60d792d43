// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Keyhold vault client.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Keyhold configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeyholdConfig {
    /// Client identity and logging.
    #[serde(default)]
    pub client: ClientConfig,

    /// Master password key derivation parameters.
    #[serde(default)]
    pub kdf: KdfConfig,

    /// Lock and idle behavior.
    #[serde(default)]
    pub session: SessionConfig,

    /// Credential handoff settings.
    #[serde(default)]
    pub handoff: HandoffConfig,

    /// Local storage locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote vault server.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Client identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Argon2id parameters plus the PBKDF2 fallback iteration count.
///
/// These must match across every client of an account: unlocking depends on
/// deriving bit-identical keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KdfConfig {
    /// Argon2id memory cost in KiB (65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_cost")]
    pub memory_cost_kib: u32,

    /// Argon2id time cost.
    #[serde(default = "default_kdf_iterations")]
    pub iterations: u32,

    /// Argon2id lanes.
    #[serde(default = "default_kdf_parallelism")]
    pub parallelism: u32,

    /// PBKDF2-HMAC-SHA256 iterations used when Argon2id is unavailable.
    #[serde(default = "default_fallback_iterations")]
    pub fallback_iterations: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: default_kdf_memory_cost(),
            iterations: default_kdf_iterations(),
            parallelism: default_kdf_parallelism(),
            fallback_iterations: default_fallback_iterations(),
        }
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

fn default_fallback_iterations() -> u32 {
    310_000
}

/// Lock and idle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Lock automatically after `idle_timeout_secs` without activity.
    #[serde(default = "default_auto_lock")]
    pub auto_lock: bool,

    /// Idle period before auto-lock. Values below 30 seconds are raised to 30.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// SECURITY TRADEOFF: when auto-lock is disabled, keep the unwrapped data
    /// key in the volatile store so the vault stays unlocked across restarts.
    /// Has no effect while auto-lock is enabled.
    #[serde(default = "default_persist_key_without_auto_lock")]
    pub persist_key_without_auto_lock: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_lock: default_auto_lock(),
            idle_timeout_secs: default_idle_timeout_secs(),
            persist_key_without_auto_lock: default_persist_key_without_auto_lock(),
        }
    }
}

fn default_auto_lock() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    15 * 60
}

fn default_persist_key_without_auto_lock() -> bool {
    true
}

/// Credential handoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HandoffConfig {
    /// Maximum age of a pending handoff when it is consumed.
    #[serde(default = "default_handoff_ttl_secs")]
    pub ttl_secs: u64,

    /// Domains for which save prompts are never offered.
    #[serde(default)]
    pub disabled_sites: Vec<String>,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_handoff_ttl_secs(),
            disabled_sites: Vec::new(),
        }
    }
}

fn default_handoff_ttl_secs() -> u64 {
    60
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite cache holding the session shell and encrypted items.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Directory for the volatile key file. Defaults to `$XDG_RUNTIME_DIR/keyhold`.
    #[serde(default)]
    pub volatile_dir: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            volatile_dir: None,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("keyhold").join("cache.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("keyhold-cache.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Remote vault server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Base URL of the vault API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
