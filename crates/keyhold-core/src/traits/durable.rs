// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable local storage: survives restarts, never holds key material.

use async_trait::async_trait;

use crate::error::KeyholdError;
use crate::traits::adapter::StoreAdapter;
use crate::types::{AutoLockPolicy, EncryptedItem, PersistedSession};

/// Persists the session shell, the bearer token, and the encrypted item set.
#[async_trait]
pub trait DurableStore: StoreAdapter {
    /// Replaces the stored session.
    async fn save_session(&self, session: &PersistedSession) -> Result<(), KeyholdError>;

    /// Loads the stored session, if any.
    async fn load_session(&self) -> Result<Option<PersistedSession>, KeyholdError>;

    /// Replaces the stored item set atomically.
    async fn save_items(&self, items: &[EncryptedItem]) -> Result<(), KeyholdError>;

    /// Loads every stored item.
    async fn load_items(&self) -> Result<Vec<EncryptedItem>, KeyholdError>;

    /// Purges the session and all items. The auto-lock policy stays.
    async fn clear(&self) -> Result<(), KeyholdError>;

    /// Replaces the stored auto-lock policy.
    async fn save_auto_lock(&self, policy: &AutoLockPolicy) -> Result<(), KeyholdError>;

    /// Loads the stored auto-lock policy; `None` until one is saved.
    async fn load_auto_lock(&self) -> Result<Option<AutoLockPolicy>, KeyholdError>;
}
