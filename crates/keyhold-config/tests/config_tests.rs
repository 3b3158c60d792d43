// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Keyhold configuration system.

use keyhold_config::diagnostic::ConfigError;
use keyhold_config::model::KeyholdConfig;
use keyhold_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[client]
log_level = "debug"

[kdf]
memory_cost_kib = 131072
iterations = 4
parallelism = 2
fallback_iterations = 600000

[session]
auto_lock = false
idle_timeout_secs = 60
persist_key_without_auto_lock = false

[handoff]
ttl_secs = 45
disabled_sites = ["bank.example", "intranet.local"]

[storage]
database_path = "/tmp/keyhold.db"
wal_mode = false
volatile_dir = "/run/user/1000/keyhold"

[remote]
base_url = "https://vault.example/api"
timeout_secs = 10
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.client.log_level, "debug");
    assert_eq!(config.kdf.memory_cost_kib, 131072);
    assert_eq!(config.kdf.iterations, 4);
    assert_eq!(config.kdf.parallelism, 2);
    assert_eq!(config.kdf.fallback_iterations, 600000);
    assert!(!config.session.auto_lock);
    assert_eq!(config.session.idle_timeout_secs, 60);
    assert!(!config.session.persist_key_without_auto_lock);
    assert_eq!(config.handoff.ttl_secs, 45);
    assert_eq!(config.handoff.disabled_sites.len(), 2);
    assert_eq!(config.storage.database_path, "/tmp/keyhold.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(
        config.storage.volatile_dir.as_deref(),
        Some("/run/user/1000/keyhold")
    );
    assert_eq!(config.remote.base_url, "https://vault.example/api");
    assert_eq!(config.remote.timeout_secs, 10);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    let defaults = KeyholdConfig::default();
    assert_eq!(config.kdf, defaults.kdf);
    assert_eq!(config.session.idle_timeout_secs, defaults.session.idle_timeout_secs);
    assert_eq!(config.handoff.ttl_secs, 60);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[session]
idle_timout_secs = 120
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } if key == "idle_timout_secs" => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("idle_timeout_secs"));
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[handoff]
ttl_secs = "soon"
"#;

    let errors = load_and_validate_str(toml).expect_err("string for integer must fail");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_))));
}

#[test]
fn validation_errors_are_collected() {
    let toml = r#"
[kdf]
iterations = 1

[session]
idle_timeout_secs = 1
"#;

    let errors = load_and_validate_str(toml).expect_err("weak values must fail validation");
    let keys: Vec<String> = errors.iter().filter_map(ConfigError::key).collect();
    assert_eq!(keys, ["kdf.iterations", "session.idle_timeout_secs"]);
    assert!(matches!(errors[0], ConfigError::WeakKdf { value: 1, .. }));
    assert!(matches!(errors[1], ConfigError::OutOfRange { value: 1, .. }));
}

#[test]
fn key_under_wrong_section_names_its_home() {
    let toml = r#"
[kdf]
iterations = 3
idle_timeout_secs = 120
"#;

    let errors = load_and_validate_str(toml).expect_err("misplaced key must be rejected");
    let (suggestion, span) = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                section,
                suggestion,
                span,
                ..
            } if section == "kdf" => Some((suggestion.clone(), *span)),
            _ => None,
        })
        .expect("unknown key diagnostic");
    assert_eq!(suggestion.as_deref(), Some("session.idle_timeout_secs"));

    let span = span.expect("span into the inline source");
    assert_eq!(&toml[span.offset()..span.offset() + span.len()], "idle_timeout_secs");
}

#[test]
fn top_level_key_is_an_unknown_section() {
    let errors = load_and_validate_str("ttl_secs = 30\n").expect_err("bare key must be rejected");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::UnknownSection { suggestion: Some(s), .. } if s == "handoff.ttl_secs"
    )));
}

#[test]
fn validation_help_names_env_override() {
    use miette::Diagnostic;

    let toml = r#"
[storage]
database_path = " "
"#;
    let errors = load_and_validate_str(toml).expect_err("blank path must be rejected");
    let help = errors[0].help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("KEYHOLD_STORAGE_DATABASE_PATH"));
}

#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[telemetry]
enabled = true
"#;
    assert!(load_config_from_str(toml).is_err());
}
