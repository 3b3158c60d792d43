// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`DurableStore`].
//!
//! Holds the session shell, the bearer token and the encrypted item set.
//! Nothing written here is plaintext item content or key material beyond the
//! already-wrapped data key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use uuid::Uuid;

use keyhold_config::model::StorageConfig;
use keyhold_core::encoding;
use keyhold_core::types::{AutoLockPolicy, PersistedSession};
use keyhold_core::{
    AdapterType, DurableStore, EncryptedItem, HealthStatus, ItemIdentifier, KeyholdError,
    SessionShell, StoreAdapter, Vault,
};

use crate::database::{map_tr_err, Database};

/// Raw `session` row, binary fields still base64 encoded.
struct SessionRow {
    user_id: String,
    email: String,
    vaults: String,
    salt: String,
    wrapped_data_key: String,
    access_token: String,
}

/// Raw `items` row.
struct ItemRow {
    remote_id: Option<i64>,
    uuid: Option<String>,
    vault_id: i64,
    ciphertext: String,
    nonce: String,
    created_at: String,
    updated_at: String,
}

/// SQLite-backed durable store.
pub struct SqliteDurableStore {
    db: Database,
}

impl SqliteDurableStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database described by the storage config.
    pub async fn open(config: &StorageConfig) -> Result<Self, KeyholdError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "durable store opened");
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl StoreAdapter for SqliteDurableStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Durable
    }

    async fn health_check(&self) -> Result<HealthStatus, KeyholdError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl DurableStore for SqliteDurableStore {
    async fn save_session(&self, session: &PersistedSession) -> Result<(), KeyholdError> {
        let vaults = serde_json::to_string(&session.shell.vaults).map_err(|e| {
            KeyholdError::Storage {
                source: Box::new(e),
            }
        })?;
        let row = SessionRow {
            user_id: session.shell.user_id.clone(),
            email: session.shell.email.clone(),
            vaults,
            salt: encoding::encode(&session.shell.salt),
            wrapped_data_key: encoding::encode(&session.shell.wrapped_data_key),
            access_token: session.access_token.expose_secret().to_string(),
        };

        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT OR REPLACE INTO session
                     (slot, user_id, email, vaults, salt, wrapped_data_key, access_token, updated_at)
                     VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                    params![
                        row.user_id,
                        row.email,
                        row.vaults,
                        row.salt,
                        row.wrapped_data_key,
                        row.access_token,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn load_session(&self) -> Result<Option<PersistedSession>, KeyholdError> {
        let row = self
            .db
            .connection()
            .call(|conn| -> Result<Option<SessionRow>, rusqlite::Error> {
                let result = conn.query_row(
                    "SELECT user_id, email, vaults, salt, wrapped_data_key, access_token
                     FROM session WHERE slot = 1",
                    [],
                    |row| {
                        Ok(SessionRow {
                            user_id: row.get(0)?,
                            email: row.get(1)?,
                            vaults: row.get(2)?,
                            salt: row.get(3)?,
                            wrapped_data_key: row.get(4)?,
                            access_token: row.get(5)?,
                        })
                    },
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let vaults: Vec<Vault> =
            serde_json::from_str(&row.vaults).map_err(|e| KeyholdError::Storage {
                source: Box::new(e),
            })?;
        Ok(Some(PersistedSession {
            shell: SessionShell {
                user_id: row.user_id,
                email: row.email,
                vaults,
                salt: encoding::decode("salt", &row.salt)?,
                wrapped_data_key: encoding::decode("wrapped_data_key", &row.wrapped_data_key)?,
            },
            access_token: SecretString::from(row.access_token),
        }))
    }

    async fn save_items(&self, items: &[EncryptedItem]) -> Result<(), KeyholdError> {
        let rows: Vec<ItemRow> = items.iter().map(to_row).collect();
        let count = rows.len();

        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM items", [])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO items
                         (remote_id, uuid, vault_id, ciphertext, nonce, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for row in &rows {
                        stmt.execute(params![
                            row.remote_id,
                            row.uuid,
                            row.vault_id,
                            row.ciphertext,
                            row.nonce,
                            row.created_at,
                            row.updated_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(count, "encrypted items persisted");
        Ok(())
    }

    async fn load_items(&self) -> Result<Vec<EncryptedItem>, KeyholdError> {
        let rows = self
            .db
            .connection()
            .call(|conn| -> Result<Vec<ItemRow>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT remote_id, uuid, vault_id, ciphertext, nonce, created_at, updated_at
                     FROM items ORDER BY position",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(ItemRow {
                        remote_id: row.get(0)?,
                        uuid: row.get(1)?,
                        vault_id: row.get(2)?,
                        ciphertext: row.get(3)?,
                        nonce: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                })?;
                let rows = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        rows.into_iter().map(from_row).collect()
    }

    async fn clear(&self) -> Result<(), KeyholdError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM items", [])?;
                tx.execute("DELETE FROM session", [])?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("durable store cleared");
        Ok(())
    }

    async fn save_auto_lock(&self, policy: &AutoLockPolicy) -> Result<(), KeyholdError> {
        let enabled = policy.enabled;
        let idle_timeout_secs = i64::try_from(policy.idle_timeout_secs).unwrap_or(i64::MAX);
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT OR REPLACE INTO auto_lock_policy (slot, enabled, idle_timeout_secs)
                     VALUES (1, ?1, ?2)",
                    params![enabled, idle_timeout_secs],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(enabled, "auto-lock policy persisted");
        Ok(())
    }

    async fn load_auto_lock(&self) -> Result<Option<AutoLockPolicy>, KeyholdError> {
        let row = self
            .db
            .connection()
            .call(|conn| -> Result<Option<(bool, i64)>, rusqlite::Error> {
                let result = conn.query_row(
                    "SELECT enabled, idle_timeout_secs FROM auto_lock_policy WHERE slot = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;

        Ok(row.map(|(enabled, secs)| AutoLockPolicy {
            enabled,
            idle_timeout_secs: u64::try_from(secs).unwrap_or(0),
        }))
    }
}

fn to_row(item: &EncryptedItem) -> ItemRow {
    let (remote_id, uuid) = match &item.uuid {
        ItemIdentifier::Stable(uuid) => (item.id, Some(uuid.to_string())),
        ItemIdentifier::Provisional(id) => (Some(item.id.unwrap_or(*id)), None),
    };
    ItemRow {
        remote_id,
        uuid,
        vault_id: item.vault_id,
        ciphertext: encoding::encode(&item.ciphertext),
        nonce: encoding::encode(&item.nonce),
        created_at: item.created_at.to_rfc3339(),
        updated_at: item.updated_at.to_rfc3339(),
    }
}

fn from_row(row: ItemRow) -> Result<EncryptedItem, KeyholdError> {
    let uuid = match (row.uuid, row.remote_id) {
        (Some(text), _) => ItemIdentifier::Stable(Uuid::parse_str(&text).map_err(|e| {
            KeyholdError::Storage {
                source: Box::new(e),
            }
        })?),
        (None, Some(id)) => ItemIdentifier::Provisional(id),
        (None, None) => {
            return Err(KeyholdError::Storage {
                source: "item row has neither uuid nor remote id".into(),
            });
        }
    };
    Ok(EncryptedItem {
        id: row.remote_id,
        uuid,
        vault_id: row.vault_id,
        ciphertext: encoding::decode("ciphertext", &row.ciphertext)?,
        nonce: encoding::decode("nonce", &row.nonce)?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, KeyholdError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| KeyholdError::Storage {
            source: Box::new(e),
        })
}
