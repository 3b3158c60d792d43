// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the Keyhold vault client.
//!
//! Messages never carry secret material. Derivation and unwrap failures are
//! collapsed into [`KeyholdError::InvalidMasterPassword`] so callers cannot
//! tell a wrong password apart from corrupted key material.

use thiserror::Error;

/// The primary error type used across all Keyhold crates.
#[derive(Debug, Error)]
pub enum KeyholdError {
    /// Both the memory-hard derivation and its fallback failed. Fatal.
    #[error("critical security failure: no usable key derivation")]
    CriticalSecurityFailure,

    /// The wrapped data key could not be unwrapped with the derived key.
    #[error("invalid master password")]
    InvalidMasterPassword,

    /// A single record failed authentication or could not be parsed.
    #[error("failed to decrypt item {item}")]
    Decryption { item: String },

    /// The remote store could not be reached or rejected the request.
    #[error("network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation needs an unlocked (or at least existing) session.
    #[error("not authenticated or vault locked")]
    NotAuthenticatedOrLocked,

    /// Configuration errors (invalid TOML, values out of range).
    #[error("configuration error: {0}")]
    Config(String),

    /// Local storage backend errors (database, filesystem, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Primitive failures that are not password related (RNG, key setup).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeyholdError {
    /// Shorthand for a [`KeyholdError::Network`] without an underlying source.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the user can act on this error (re-enter password, retry sync).
    ///
    /// Non-recoverable errors require a restart.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            KeyholdError::CriticalSecurityFailure | KeyholdError::Internal(_)
        )
    }
}
