// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote store trait: authentication, item CRUD, and vault CRUD.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::KeyholdError;
use crate::traits::adapter::StoreAdapter;
use crate::types::{
    EncryptedItem, LoginSnapshot, MasterKeyUpdate, PreloginInfo, RegisterRequest, Vault,
};

/// The server side of the vault. Every call after login carries the bearer
/// token. Failures surface as [`KeyholdError::Network`].
#[async_trait]
pub trait RemoteStore: StoreAdapter {
    /// Looks up the public salt for an account before any key is derived.
    async fn prelogin(&self, email: &str) -> Result<PreloginInfo, KeyholdError>;

    /// Creates an account from derived material and logs it in.
    async fn register(&self, request: RegisterRequest) -> Result<LoginSnapshot, KeyholdError>;

    /// Authenticates with the derived auth proof.
    async fn login(
        &self,
        email: &str,
        auth_proof: &SecretString,
    ) -> Result<LoginSnapshot, KeyholdError>;

    /// Fetches the full item collection.
    async fn fetch_items(&self, token: &SecretString) -> Result<Vec<EncryptedItem>, KeyholdError>;

    /// Creates an item; returns it with the server-assigned id and timestamps.
    async fn create_item(
        &self,
        token: &SecretString,
        item: &EncryptedItem,
    ) -> Result<EncryptedItem, KeyholdError>;

    /// Updates an item addressed by its numeric id.
    async fn update_item(
        &self,
        token: &SecretString,
        item: &EncryptedItem,
    ) -> Result<EncryptedItem, KeyholdError>;

    /// Deletes an item by its numeric id.
    async fn delete_item(&self, token: &SecretString, id: i64) -> Result<(), KeyholdError>;

    async fn list_vaults(&self, token: &SecretString) -> Result<Vec<Vault>, KeyholdError>;

    async fn create_vault(
        &self,
        token: &SecretString,
        name: &str,
        icon: Option<&str>,
    ) -> Result<Vault, KeyholdError>;

    async fn update_vault(&self, token: &SecretString, vault: &Vault)
        -> Result<Vault, KeyholdError>;

    async fn delete_vault(&self, token: &SecretString, id: i64) -> Result<(), KeyholdError>;

    /// Replaces the salt, auth proof and wrapped data key after a password change.
    async fn update_master_key(
        &self,
        token: &SecretString,
        update: MasterKeyUpdate,
    ) -> Result<(), KeyholdError>;
}
