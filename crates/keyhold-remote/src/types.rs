// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies of the vault server API.
//!
//! Binary fields travel as standard base64 strings. Items are addressed by
//! numeric id in URLs and carry their UUID (if any) in the body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyhold_core::encoding::base64_bytes;
use keyhold_core::{EncryptedItem, ItemIdentifier, KeyholdError, Vault};

#[derive(Debug, Serialize)]
pub struct PreloginRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PreloginResponse {
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct RegisterBody<'a> {
    pub email: &'a str,
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    pub auth_proof: &'a str,
    #[serde(with = "base64_bytes")]
    pub wrapped_data_key: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct LoginBody<'a> {
    pub email: &'a str,
    pub auth_proof: &'a str,
}

/// Returned by both register and login.
#[derive(Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: String,
    pub email: String,
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub wrapped_data_key: Vec<u8>,
    #[serde(default)]
    pub vaults: Vec<Vault>,
    #[serde(default)]
    pub items: Vec<WireItem>,
}

/// An item as the server stores it. Older rows have no `uuid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireItem {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub vault_id: i64,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WireItem {
    pub fn into_item(self) -> Result<EncryptedItem, KeyholdError> {
        Ok(EncryptedItem {
            uuid: ItemIdentifier::from_wire(self.uuid.as_deref(), self.id)?,
            id: Some(self.id),
            vault_id: self.vault_id,
            ciphertext: self.ciphertext,
            nonce: self.nonce,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Body for item create and update.
#[derive(Debug, Serialize)]
pub struct ItemBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub vault_id: i64,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

impl From<&EncryptedItem> for ItemBody {
    fn from(item: &EncryptedItem) -> Self {
        Self {
            uuid: item.uuid.as_uuid().map(|u| u.to_string()),
            vault_id: item.vault_id,
            ciphertext: item.ciphertext.clone(),
            nonce: item.nonce.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VaultBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct MasterKeyBody<'a> {
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    pub auth_proof: &'a str,
    #[serde(with = "base64_bytes")]
    pub wrapped_data_key: Vec<u8>,
}

/// Error body returned by the server on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
}
