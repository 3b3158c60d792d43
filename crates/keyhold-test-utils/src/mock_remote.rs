// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vault server implementing `RemoteStore`.
//!
//! Accounts are keyed by email and checked against the auth proof. Item and
//! vault calls share one collection and accept any bearer token; the master
//! key update resolves the account from the token it was issued.
//! Tests can take the server offline or park the next call on a gate to
//! interleave other operations with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use keyhold_core::types::{
    LoginSnapshot, MasterKeyUpdate, PreloginInfo, RegisterRequest,
};
use keyhold_core::{
    AdapterType, EncryptedItem, HealthStatus, KeyholdError, RemoteStore, StoreAdapter, Vault,
};

struct Account {
    user_id: String,
    salt: Vec<u8>,
    auth_proof: String,
    wrapped_data_key: Vec<u8>,
}

#[derive(Default)]
struct ServerState {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    items: Vec<EncryptedItem>,
    vaults: Vec<Vault>,
    deleted: Vec<i64>,
    next_item_id: i64,
    next_vault_id: i64,
    next_token: u64,
}

impl ServerState {
    fn snapshot(&mut self, email: &str) -> Result<LoginSnapshot, KeyholdError> {
        let account = self
            .accounts
            .get(email)
            .ok_or(KeyholdError::InvalidMasterPassword)?;
        let (user_id, salt, wrapped_data_key) = (
            account.user_id.clone(),
            account.salt.clone(),
            account.wrapped_data_key.clone(),
        );

        self.next_token += 1;
        let token = format!("mock-token-{}", self.next_token);
        self.tokens.insert(token.clone(), email.to_string());

        Ok(LoginSnapshot {
            access_token: SecretString::from(token),
            user_id,
            email: email.to_string(),
            salt,
            wrapped_data_key,
            vaults: self.vaults.clone(),
            items: self.items.clone(),
        })
    }
}

/// A mock remote store for deterministic tests.
pub struct MockRemoteStore {
    state: Mutex<ServerState>,
    offline: AtomicBool,
    calls: AtomicUsize,
    hold_next: AtomicBool,
    held: Notify,
    released: Notify,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            hold_next: AtomicBool::new(false),
            held: Notify::new(),
            released: Notify::new(),
        }
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Park the next call until [`release`](Self::release) is called.
    pub fn hold_next_call(&self) {
        self.hold_next.store(true, Ordering::SeqCst);
    }

    /// Resolves once a call is parked on the gate.
    pub async fn wait_until_held(&self) {
        self.held.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    /// Number of calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Remote ids deleted so far, in order.
    pub fn deleted(&self) -> Vec<i64> {
        self.lock().deleted.clone()
    }

    /// Current server-side item collection.
    pub fn items(&self) -> Vec<EncryptedItem> {
        self.lock().items.clone()
    }

    pub fn vaults(&self) -> Vec<Vault> {
        self.lock().vaults.clone()
    }

    /// Seed a row as another client (or an older server) would have left it.
    pub fn insert_item(&self, mut item: EncryptedItem) -> EncryptedItem {
        let mut state = self.lock();
        if item.id.is_none() {
            state.next_item_id += 1;
            item.id = Some(state.next_item_id);
        }
        state.items.push(item.clone());
        item
    }

    /// The wrapped data key currently stored for `email`.
    pub fn wrapped_key(&self, email: &str) -> Option<Vec<u8>> {
        self.lock()
            .accounts
            .get(email)
            .map(|account| account.wrapped_data_key.clone())
    }

    /// Overwrite the wrapped key stored for `email`, as a corrupted or
    /// tampered server would serve it.
    pub fn set_wrapped_key(&self, email: &str, wrapped: Vec<u8>) {
        if let Some(account) = self.lock().accounts.get_mut(email) {
            account.wrapped_data_key = wrapped;
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn enter(&self) -> Result<(), KeyholdError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_next.swap(false, Ordering::SeqCst) {
            self.held.notify_one();
            self.released.notified().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(KeyholdError::network("mock remote is offline"));
        }
        Ok(())
    }
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for MockRemoteStore {
    fn name(&self) -> &str {
        "mock-remote"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Remote
    }

    async fn health_check(&self) -> Result<HealthStatus, KeyholdError> {
        if self.offline.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("offline".to_string()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn prelogin(&self, email: &str) -> Result<PreloginInfo, KeyholdError> {
        self.enter().await?;
        let state = self.lock();
        state
            .accounts
            .get(email)
            .map(|account| PreloginInfo {
                salt: account.salt.clone(),
            })
            .ok_or_else(|| KeyholdError::network(format!("unknown account {email}")))
    }

    async fn register(&self, request: RegisterRequest) -> Result<LoginSnapshot, KeyholdError> {
        self.enter().await?;
        let mut state = self.lock();
        if state.accounts.contains_key(&request.email) {
            return Err(KeyholdError::network("account already exists"));
        }
        let user_id = format!("user-{}", state.accounts.len() + 1);
        state.accounts.insert(
            request.email.clone(),
            Account {
                user_id,
                salt: request.salt,
                auth_proof: request.auth_proof.expose_secret().to_string(),
                wrapped_data_key: request.wrapped_data_key,
            },
        );
        if state.vaults.is_empty() {
            state.next_vault_id += 1;
            let id = state.next_vault_id;
            state.vaults.push(Vault {
                id,
                name: "Personal".to_string(),
                icon: None,
            });
        }
        state.snapshot(&request.email)
    }

    async fn login(
        &self,
        email: &str,
        auth_proof: &SecretString,
    ) -> Result<LoginSnapshot, KeyholdError> {
        self.enter().await?;
        let mut state = self.lock();
        let accepted = state
            .accounts
            .get(email)
            .is_some_and(|account| account.auth_proof == auth_proof.expose_secret());
        if !accepted {
            return Err(KeyholdError::InvalidMasterPassword);
        }
        state.snapshot(email)
    }

    async fn fetch_items(&self, _token: &SecretString) -> Result<Vec<EncryptedItem>, KeyholdError> {
        self.enter().await?;
        Ok(self.lock().items.clone())
    }

    async fn create_item(
        &self,
        _token: &SecretString,
        item: &EncryptedItem,
    ) -> Result<EncryptedItem, KeyholdError> {
        self.enter().await?;
        let mut state = self.lock();
        state.next_item_id += 1;
        let now = Utc::now();
        let mut stored = item.clone();
        stored.id = Some(state.next_item_id);
        stored.created_at = now;
        stored.updated_at = now;
        state.items.push(stored.clone());
        Ok(stored)
    }

    async fn update_item(
        &self,
        _token: &SecretString,
        item: &EncryptedItem,
    ) -> Result<EncryptedItem, KeyholdError> {
        self.enter().await?;
        let id = item
            .id
            .ok_or_else(|| KeyholdError::network("update without remote id"))?;
        let mut state = self.lock();
        let mut stored = item.clone();
        stored.updated_at = Utc::now();
        match state.items.iter_mut().find(|existing| existing.id == Some(id)) {
            Some(existing) => *existing = stored.clone(),
            None => state.items.push(stored.clone()),
        }
        Ok(stored)
    }

    async fn delete_item(&self, _token: &SecretString, id: i64) -> Result<(), KeyholdError> {
        self.enter().await?;
        let mut state = self.lock();
        state.items.retain(|item| item.id != Some(id));
        state.deleted.push(id);
        Ok(())
    }

    async fn list_vaults(&self, _token: &SecretString) -> Result<Vec<Vault>, KeyholdError> {
        self.enter().await?;
        Ok(self.lock().vaults.clone())
    }

    async fn create_vault(
        &self,
        _token: &SecretString,
        name: &str,
        icon: Option<&str>,
    ) -> Result<Vault, KeyholdError> {
        self.enter().await?;
        let mut state = self.lock();
        state.next_vault_id += 1;
        let vault = Vault {
            id: state.next_vault_id,
            name: name.to_string(),
            icon: icon.map(str::to_string),
        };
        state.vaults.push(vault.clone());
        Ok(vault)
    }

    async fn update_vault(
        &self,
        _token: &SecretString,
        vault: &Vault,
    ) -> Result<Vault, KeyholdError> {
        self.enter().await?;
        let mut state = self.lock();
        let existing = state
            .vaults
            .iter_mut()
            .find(|existing| existing.id == vault.id)
            .ok_or_else(|| KeyholdError::network(format!("vault {} not found", vault.id)))?;
        *existing = vault.clone();
        Ok(vault.clone())
    }

    async fn delete_vault(&self, _token: &SecretString, id: i64) -> Result<(), KeyholdError> {
        self.enter().await?;
        let mut state = self.lock();
        state.vaults.retain(|vault| vault.id != id);
        state.items.retain(|item| item.vault_id != id);
        Ok(())
    }

    async fn update_master_key(
        &self,
        token: &SecretString,
        update: MasterKeyUpdate,
    ) -> Result<(), KeyholdError> {
        self.enter().await?;
        let mut state = self.lock();
        let email = state
            .tokens
            .get(token.expose_secret())
            .cloned()
            .ok_or(KeyholdError::NotAuthenticatedOrLocked)?;
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or(KeyholdError::NotAuthenticatedOrLocked)?;
        account.salt = update.salt;
        account.auth_proof = update.auth_proof.expose_secret().to_string();
        account.wrapped_data_key = update.wrapped_data_key;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn register_request(email: &str, proof: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            salt: vec![7; 16],
            auth_proof: SecretString::from(proof),
            wrapped_data_key: vec![1; 40],
        }
    }

    #[tokio::test]
    async fn register_then_login_with_same_proof() {
        let remote = MockRemoteStore::new();
        let registered = remote
            .register(register_request("ada@example.com", "proof"))
            .await
            .unwrap();
        assert_eq!(registered.vaults.len(), 1);

        let info = remote.prelogin("ada@example.com").await.unwrap();
        assert_eq!(info.salt, vec![7; 16]);

        let snapshot = remote
            .login("ada@example.com", &SecretString::from("proof"))
            .await
            .unwrap();
        assert_eq!(snapshot.wrapped_data_key, vec![1; 40]);
    }

    #[tokio::test]
    async fn wrong_proof_is_rejected() {
        let remote = MockRemoteStore::new();
        remote
            .register(register_request("ada@example.com", "proof"))
            .await
            .unwrap();

        let err = remote
            .login("ada@example.com", &SecretString::from("guess"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyholdError::InvalidMasterPassword));
    }

    #[tokio::test]
    async fn offline_fails_every_call() {
        let remote = MockRemoteStore::new();
        remote.set_offline(true);
        let err = remote
            .fetch_items(&SecretString::from("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyholdError::Network { .. }));
        assert_eq!(remote.call_count(), 1);
    }

    #[tokio::test]
    async fn gate_parks_one_call() {
        let remote = Arc::new(MockRemoteStore::new());
        remote.hold_next_call();

        let call = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.list_vaults(&SecretString::from("tok")).await })
        };
        remote.wait_until_held().await;
        assert!(!call.is_finished());

        remote.release();
        assert!(call.await.unwrap().is_ok());
        // The gate only applies once.
        assert!(remote.list_vaults(&SecretString::from("tok")).await.is_ok());
    }
}
