// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Keyhold vault client.
//!
//! Layers compiled defaults, the keyhold.toml files and `KEYHOLD_*`
//! variables, then checks the result against the KDF, session and handoff
//! floors in [`validation`]. Every failure comes back as a [`ConfigError`]
//! so the binary can print them all before exiting.
//!
//! ```no_run
//! let config = match keyhold_config::load_and_validate() {
//!     Ok(config) => config,
//!     Err(errors) => {
//!         keyhold_config::render_errors(&errors);
//!         std::process::exit(1);
//!     }
//! };
//! println!("idle timeout: {}s", config.session.idle_timeout_secs);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::KeyholdConfig;

/// Load from the file hierarchy and environment, then validate.
pub fn load_and_validate() -> Result<KeyholdConfig, Vec<ConfigError>> {
    checked(loader::load_config(), || {
        loader::config_files()
            .into_iter()
            .filter_map(|path| {
                let content = std::fs::read_to_string(&path).ok()?;
                let shown = std::path::absolute(&path).unwrap_or(path);
                Some((shown.display().to_string(), content))
            })
            .collect()
    })
}

/// Load a single TOML document over the defaults, then validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<KeyholdConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![("keyhold.toml".to_string(), toml_content.to_string())]
    })
}

// Sources are only read back when there is an error to point into.
fn checked(
    loaded: Result<KeyholdConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<KeyholdConfig, Vec<ConfigError>> {
    let config =
        loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}
