// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes:
//! KDF strength floors, idle and TTL ranges, and parseable URLs. Each finding
//! names the dotted key it concerns.

use crate::diagnostic::ConfigError;
use crate::model::KeyholdConfig;

/// Smallest Argon2id memory cost accepted (64 MiB).
pub const MIN_KDF_MEMORY_COST_KIB: u32 = 65536;

/// Smallest Argon2id time cost accepted.
pub const MIN_KDF_ITERATIONS: u32 = 3;

/// Smallest PBKDF2 iteration count accepted for the fallback path.
pub const MIN_FALLBACK_ITERATIONS: u32 = 310_000;

/// Smallest idle timeout accepted.
pub const MIN_IDLE_TIMEOUT_SECS: u64 = 30;

/// Largest handoff TTL accepted.
pub const MAX_HANDOFF_TTL_SECS: u64 = 600;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &KeyholdConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let kdf = &config.kdf;
    let kdf_floors = [
        ("kdf.memory_cost_kib", kdf.memory_cost_kib, MIN_KDF_MEMORY_COST_KIB),
        ("kdf.iterations", kdf.iterations, MIN_KDF_ITERATIONS),
        ("kdf.parallelism", kdf.parallelism, 1),
        ("kdf.fallback_iterations", kdf.fallback_iterations, MIN_FALLBACK_ITERATIONS),
    ];
    for (key, value, minimum) in kdf_floors {
        if value < minimum {
            errors.push(ConfigError::WeakKdf {
                key: key.to_string(),
                value: value.into(),
                minimum: minimum.into(),
            });
        }
    }

    check_range(
        &mut errors,
        "session.idle_timeout_secs",
        config.session.idle_timeout_secs,
        MIN_IDLE_TIMEOUT_SECS..=u64::MAX,
    );
    check_range(
        &mut errors,
        "handoff.ttl_secs",
        config.handoff.ttl_secs,
        1..=MAX_HANDOFF_TTL_SECS,
    );
    check_range(
        &mut errors,
        "remote.timeout_secs",
        config.remote.timeout_secs,
        1..=u64::MAX,
    );

    for (i, site) in config.handoff.disabled_sites.iter().enumerate() {
        if site.trim().is_empty() {
            errors.push(invalid(format!("handoff.disabled_sites[{i}]"), "site must not be blank"));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(invalid("storage.database_path", "path must not be empty"));
    }

    match url::Url::parse(&config.remote.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(invalid(
            "remote.base_url",
            format!("scheme `{}` is not http or https", url.scheme()),
        )),
        Err(e) => errors.push(invalid(
            "remote.base_url",
            format!("`{}` is not a valid URL: {e}", config.remote.base_url),
        )),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_range(
    errors: &mut Vec<ConfigError>,
    key: &str,
    value: u64,
    range: std::ops::RangeInclusive<u64>,
) {
    if !range.contains(&value) {
        errors.push(ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            min: *range.start(),
            max: *range.end(),
        });
    }
}

fn invalid(key: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        reason: reason.into(),
    }
}
