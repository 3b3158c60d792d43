// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config diagnostics rendered through miette.
//!
//! Load failures from figment and findings from [`crate::validation`] both end
//! up as [`ConfigError`]. Unknown keys are checked against the section table
//! generated from [`KeyholdConfig`], so a key placed under the wrong header is
//! pointed at the header it belongs to.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::model::KeyholdConfig;

/// Jaro-Winkler score a candidate needs before it is offered as a fix.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A top-level table or key that no section declares.
    #[error("unknown configuration section `[{section}]`")]
    #[diagnostic(
        code(keyhold::config::unknown_section),
        help("{}", unknown_section_help(suggestion.as_deref(), sections))
    )]
    UnknownSection {
        section: String,
        suggestion: Option<String>,
        sections: String,
    },

    /// A key the section does not declare.
    ///
    /// `suggestion` is a bare key when the fix is in the same section and a
    /// dotted `section.key` when the key belongs under another header.
    #[error("unknown key `{key}` in `[{section}]`")]
    #[diagnostic(
        code(keyhold::config::unknown_key),
        help("{}", unknown_key_help(section, suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        section: String,
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a `[{section}]` key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(
        code(keyhold::config::invalid_type),
        help("expected {expected}; also check `{}`", env_var_for(key))
    )]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// Key derivation weaker than the accepted floor.
    #[error("`{key}` = {value} is weaker than the minimum of {minimum}")]
    #[diagnostic(
        code(keyhold::config::weak_kdf),
        help(
            "every device on an account must derive keys with the same parameters; \
             raise `{key}` on all of them together"
        )
    )]
    WeakKdf {
        key: String,
        value: u64,
        minimum: u64,
    },

    #[error("`{key}` = {value} is outside {min}..={max}")]
    #[diagnostic(
        code(keyhold::config::out_of_range),
        help("{}", range_help(key, *min, *max))
    )]
    OutOfRange {
        key: String,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("`{key}` is invalid: {reason}")]
    #[diagnostic(
        code(keyhold::config::invalid_value),
        help("fix `{key}` in keyhold.toml or unset `{}`", env_var_for(key))
    )]
    InvalidValue { key: String, reason: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(keyhold::config::other))]
    Other(String),
}

impl ConfigError {
    /// Dotted path of the offending key, when the error names one.
    pub fn key(&self) -> Option<String> {
        match self {
            Self::UnknownSection { section, .. } => Some(section.clone()),
            Self::UnknownKey { section, key, .. } => Some(format!("{section}.{key}")),
            Self::InvalidType { key, .. }
            | Self::WeakKdf { key, .. }
            | Self::OutOfRange { key, .. }
            | Self::InvalidValue { key, .. } => Some(key.clone()),
            Self::Other(_) => None,
        }
    }
}

fn unknown_section_help(suggestion: Option<&str>, sections: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? sections: {sections}"),
        None => format!("sections: {sections}"),
    }
}

fn unknown_key_help(section: &str, suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) if s.contains('.') => {
            let (home, key) = s.split_once('.').unwrap_or((s, ""));
            format!("`{key}` belongs in `[{home}]`; keys in `[{section}]`: {valid_keys}")
        }
        Some(s) => format!("did you mean `{s}`? keys in `[{section}]`: {valid_keys}"),
        None => format!("keys in `[{section}]`: {valid_keys}"),
    }
}

fn range_help(key: &str, min: u64, max: u64) -> String {
    if max == u64::MAX {
        format!("set `{key}` to {min} or more")
    } else {
        format!("set `{key}` between {min} and {max}")
    }
}

/// Environment variable that overrides the dotted config `key`.
///
/// `session.idle_timeout_secs` maps to `KEYHOLD_SESSION_IDLE_TIMEOUT_SECS`.
pub fn env_var_for(key: &str) -> String {
    let base = key.split('[').next().unwrap_or(key);
    format!("KEYHOLD_{}", base.replace('.', "_").to_ascii_uppercase())
}

/// Every section of [`KeyholdConfig`] with its keys, in table order.
///
/// Generated by serializing a config with every optional field populated, so
/// the table follows the model without a hand-kept list.
pub fn config_sections() -> Vec<(String, Vec<String>)> {
    let mut sample = KeyholdConfig::default();
    sample.storage.volatile_dir.get_or_insert_with(String::new);

    let Ok(toml::Value::Table(root)) = toml::Value::try_from(&sample) else {
        return Vec::new();
    };
    root.into_iter()
        .filter_map(|(section, value)| match value {
            toml::Value::Table(keys) => Some((section, keys.into_iter().map(|(k, _)| k).collect())),
            _ => None,
        })
        .collect()
}

/// Convert a figment load failure into one diagnostic per underlying error.
///
/// `sources` holds `(display path, contents)` of the TOML files that fed the
/// load, used to point spans at the offending line.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    let sections = config_sections();

    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
            match &error.kind {
                Kind::UnknownField(field, _) if path.is_empty() => {
                    unknown_section(field, &sections)
                }
                Kind::UnknownField(field, expected) => {
                    let section = path.join(".");
                    let (span, src) = locate(&error, &section, field, sources);
                    ConfigError::UnknownKey {
                        suggestion: suggest_for(&section, field, expected, &sections),
                        valid_keys: expected.join(", "),
                        section,
                        key: field.clone(),
                        span,
                        src,
                    }
                }
                Kind::InvalidType(found, expected) => {
                    let (section, field) = match path.split_last() {
                        Some((field, parents)) => (parents.join("."), field.clone()),
                        None => (String::new(), String::new()),
                    };
                    let (span, src) = locate(&error, &section, &field, sources);
                    ConfigError::InvalidType {
                        key: path.join("."),
                        found: found.to_string(),
                        expected: expected.clone(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn unknown_section(name: &str, sections: &[(String, Vec<String>)]) -> ConfigError {
    // A bare key at the top level is usually a key missing its header.
    let suggestion = sections
        .iter()
        .find(|(_, keys)| keys.iter().any(|k| k == name))
        .map(|(section, _)| format!("{section}.{name}"))
        .or_else(|| best_match(name, sections.iter().map(|(s, _)| s.as_str())));

    ConfigError::UnknownSection {
        section: name.to_string(),
        suggestion,
        sections: sections
            .iter()
            .map(|(s, _)| s.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Pick a fix for `field` found under `[section]`.
///
/// An exact key of another section wins, then the closest key of this
/// section, then the closest key anywhere.
pub fn suggest_for(
    section: &str,
    field: &str,
    expected: &[&str],
    sections: &[(String, Vec<String>)],
) -> Option<String> {
    let others = || sections.iter().filter(|(name, _)| name != section);

    if let Some((home, _)) = others().find(|(_, keys)| keys.iter().any(|k| k == field)) {
        return Some(format!("{home}.{field}"));
    }
    if let Some(key) = best_match(field, expected.iter().copied()) {
        return Some(key);
    }
    let dotted: Vec<String> = others()
        .flat_map(|(home, keys)| keys.iter().map(move |k| format!("{home}.{k}")))
        .collect();
    best_match(field, dotted.iter().map(String::as_str))
}

fn best_match<'a>(unknown: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let bare = |c: &'a str| c.rsplit('.').next().unwrap_or(c);
    candidates
        .map(|c| (strsim::jaro_winkler(unknown, bare(c)), c))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.to_string())
}

fn locate(
    error: &figment::Error,
    section: &str,
    field: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    // Files named by figment first; otherwise the first source holding the key.
    let candidates = sources
        .iter()
        .filter(|(path, _)| origin.as_ref().is_none_or(|o| o == path));

    for (path, content) in candidates {
        if let Some(offset) = find_key_offset(content, section, field) {
            return (
                Some(SourceSpan::new(offset.into(), field.len())),
                Some(NamedSource::new(path, content.clone())),
            );
        }
    }
    (None, None)
}

/// Byte offset of `field` as a key of the `[section]` table in `content`.
///
/// An empty `section` means keys above the first header. Only an assignment
/// counts, so `iterations_extra = 1` does not match `iterations`.
pub fn find_key_offset(content: &str, section: &str, field: &str) -> Option<usize> {
    let mut current = String::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(header) = trimmed.strip_prefix('[') {
            if let Some(end) = header.find(']') {
                current = header[..end].trim().to_string();
            }
        } else if current == section {
            let assigns = trimmed
                .strip_prefix(field)
                .is_some_and(|rest| rest.trim_start().starts_with('='));
            if assigns {
                return Some(offset + indent);
            }
        }
        offset += line.len();
    }
    None
}

/// Print each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
