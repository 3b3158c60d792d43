// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the session core, storage, and remote adapters.

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::encoding::{base64_bytes, base64_nonce};
use crate::error::KeyholdError;

/// Lifecycle state of the client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nobody is logged in; nothing is persisted.
    NoSession,
    /// A shell exists but the data key is not in memory.
    Locked,
    /// The data key is live in memory.
    Unlocked,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Remote,
    Durable,
    Volatile,
    Transient,
}

/// A non-secret grouping label owned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// The non-secret projection of a session. Safe to persist and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionShell {
    pub user_id: String,
    pub email: String,
    pub vaults: Vec<Vault>,
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub wrapped_data_key: Vec<u8>,
}

/// A shell plus the remote bearer token, as written to durable storage.
///
/// The token is kept out of [`SessionShell`] so it never reaches observers.
pub struct PersistedSession {
    pub shell: SessionShell,
    pub access_token: SecretString,
}

impl fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSession")
            .field("shell", &self.shell)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// The user's idle auto-lock choice, kept across restarts and logouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoLockPolicy {
    pub enabled: bool,
    pub idle_timeout_secs: u64,
}

/// Notification pushed to every observer on each session transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub shell: Option<SessionShell>,
    pub is_locked: bool,
}

/// Identifier of a vault record.
///
/// Legacy rows may reach the client without a UUID; the numeric remote id is
/// then carried as a provisional identifier until the next successful update
/// assigns a stable one. Treat the value as opaque: it is stable within a
/// session but not across an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemIdentifier {
    Stable(Uuid),
    Provisional(i64),
}

impl ItemIdentifier {
    /// A fresh random stable identifier.
    pub fn new_stable() -> Self {
        ItemIdentifier::Stable(Uuid::new_v4())
    }

    /// Build an identifier from the wire pair (optional UUID text, numeric id).
    pub fn from_wire(uuid: Option<&str>, id: i64) -> Result<Self, KeyholdError> {
        match uuid.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => Uuid::parse_str(text)
                .map(ItemIdentifier::Stable)
                .map_err(|e| KeyholdError::network(format!("malformed item uuid: {e}"))),
            None => Ok(ItemIdentifier::Provisional(id)),
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, ItemIdentifier::Provisional(_))
    }

    /// Returns the identifier to use after the next successful update.
    pub fn upgraded(&self) -> Self {
        match self {
            ItemIdentifier::Stable(_) => self.clone(),
            ItemIdentifier::Provisional(_) => Self::new_stable(),
        }
    }

    /// The UUID to send in request bodies, if one exists yet.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            ItemIdentifier::Stable(uuid) => Some(*uuid),
            ItemIdentifier::Provisional(_) => None,
        }
    }
}

impl fmt::Display for ItemIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemIdentifier::Stable(uuid) => write!(f, "{uuid}"),
            ItemIdentifier::Provisional(id) => write!(f, "provisional:{id}"),
        }
    }
}

/// Ciphertext and nonce produced by one AEAD seal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_nonce")]
    pub nonce: [u8; 12],
}

impl fmt::Debug for SealedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedBlob")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// A vault record as stored locally and remotely. Only ever produced by the
/// item cipher under the current data key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedItem {
    /// Remote numeric id, `None` until the first remote create succeeds.
    pub id: Option<i64>,
    pub uuid: ItemIdentifier,
    pub vault_id: i64,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A saved website login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub name: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl fmt::Debug for LoginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRecord")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("url", &self.url)
            .finish()
    }
}

/// A free-form secure note.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub name: String,
    pub body: String,
}

impl fmt::Debug for NoteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteRecord")
            .field("name", &self.name)
            .field("body", &"[REDACTED]")
            .finish()
    }
}

/// The encrypted part of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Login(LoginRecord),
    Note(NoteRecord),
}

impl Record {
    /// Display name shared by every record kind.
    pub fn name(&self) -> &str {
        match self {
            Record::Login(login) => &login.name,
            Record::Note(note) => &note.name,
        }
    }
}

/// A decrypted item: the record re-attached to its plaintext envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: Option<i64>,
    pub uuid: ItemIdentifier,
    pub vault_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub record: Record,
}

impl Item {
    /// A new, never-synced item with a stable identifier.
    pub fn new(vault_id: i64, record: Record) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            uuid: ItemIdentifier::new_stable(),
            vault_id,
            created_at: now,
            updated_at: now,
            record,
        }
    }
}

/// Result of the pre-authentication lookup: everything needed to derive keys.
#[derive(Debug, Clone)]
pub struct PreloginInfo {
    pub salt: Vec<u8>,
}

/// Account creation payload. Holds no password, only derived material.
#[derive(Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub salt: Vec<u8>,
    pub auth_proof: SecretString,
    pub wrapped_data_key: Vec<u8>,
}

/// Replacement key material after a master password change.
#[derive(Debug)]
pub struct MasterKeyUpdate {
    pub salt: Vec<u8>,
    pub auth_proof: SecretString,
    pub wrapped_data_key: Vec<u8>,
}

/// Everything the remote store returns on successful authentication.
#[derive(Debug)]
pub struct LoginSnapshot {
    pub access_token: SecretString,
    pub user_id: String,
    pub email: String,
    pub salt: Vec<u8>,
    pub wrapped_data_key: Vec<u8>,
    pub vaults: Vec<Vault>,
    pub items: Vec<EncryptedItem>,
}

/// An encrypted candidate credential waiting in the page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingHandoff {
    pub blob: SealedBlob,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_from_wire_falls_back_to_numeric_id() {
        let id = ItemIdentifier::from_wire(None, 42).unwrap();
        assert_eq!(id, ItemIdentifier::Provisional(42));
        let id = ItemIdentifier::from_wire(Some("  "), 43).unwrap();
        assert_eq!(id, ItemIdentifier::Provisional(43));
    }

    #[test]
    fn identifier_from_wire_parses_uuid() {
        let uuid = Uuid::new_v4();
        let id = ItemIdentifier::from_wire(Some(&uuid.to_string()), 1).unwrap();
        assert_eq!(id, ItemIdentifier::Stable(uuid));
        assert!(ItemIdentifier::from_wire(Some("nope"), 1).is_err());
    }

    #[test]
    fn upgrade_only_changes_provisional() {
        let stable = ItemIdentifier::new_stable();
        assert_eq!(stable.upgraded(), stable);

        let provisional = ItemIdentifier::Provisional(9);
        let upgraded = provisional.upgraded();
        assert!(!upgraded.is_provisional());
        assert!(upgraded.as_uuid().is_some());
    }

    #[test]
    fn record_serializes_with_kind_tag() {
        let record = Record::Note(NoteRecord {
            name: "wifi".into(),
            body: "hunter2".into(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "note");
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let login = LoginRecord {
            name: "mail".into(),
            username: "ada".into(),
            password: "correct horse".into(),
            url: None,
            notes: None,
        };
        let rendered = format!("{login:?}");
        assert!(!rendered.contains("correct horse"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn shell_serializes_binary_fields_as_base64() {
        let shell = SessionShell {
            user_id: "u1".into(),
            email: "a@example.com".into(),
            vaults: vec![],
            salt: vec![0xff; 4],
            wrapped_data_key: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&shell).unwrap();
        assert_eq!(json["salt"], "/////w==");
        assert_eq!(json["wrapped_data_key"], "AQID");
    }

    #[test]
    fn session_state_display() {
        assert_eq!(SessionState::NoSession.to_string(), "no_session");
        assert_eq!(SessionState::Unlocked.to_string(), "unlocked");
    }
}
