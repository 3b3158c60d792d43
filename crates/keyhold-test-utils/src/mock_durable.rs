// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-memory `DurableStore` for unit tests that do not need SQLite.
//! Writes can be made to fail to exercise storage error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use keyhold_core::types::{AutoLockPolicy, PersistedSession};
use keyhold_core::{
    AdapterType, DurableStore, EncryptedItem, HealthStatus, KeyholdError, SessionShell,
    StoreAdapter,
};

#[derive(Default)]
struct Contents {
    session: Option<(SessionShell, String)>,
    items: Vec<EncryptedItem>,
    auto_lock: Option<AutoLockPolicy>,
}

#[derive(Default)]
pub struct MemoryDurableStore {
    contents: Mutex<Contents>,
    failing: AtomicBool,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While failing, every write returns a storage error and changes nothing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn has_session(&self) -> bool {
        self.lock().session.is_some()
    }

    fn check_writable(&self) -> Result<(), KeyholdError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeyholdError::Storage {
                source: "memory durable store is failing writes".into(),
            });
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Contents> {
        match self.contents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl StoreAdapter for MemoryDurableStore {
    fn name(&self) -> &str {
        "memory-durable"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Durable
    }

    async fn health_check(&self) -> Result<HealthStatus, KeyholdError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn save_session(&self, session: &PersistedSession) -> Result<(), KeyholdError> {
        self.check_writable()?;
        self.lock().session = Some((
            session.shell.clone(),
            session.access_token.expose_secret().to_string(),
        ));
        Ok(())
    }

    async fn load_session(&self) -> Result<Option<PersistedSession>, KeyholdError> {
        Ok(self
            .lock()
            .session
            .as_ref()
            .map(|(shell, token)| PersistedSession {
                shell: shell.clone(),
                access_token: SecretString::from(token.clone()),
            }))
    }

    async fn save_items(&self, items: &[EncryptedItem]) -> Result<(), KeyholdError> {
        self.check_writable()?;
        self.lock().items = items.to_vec();
        Ok(())
    }

    async fn load_items(&self) -> Result<Vec<EncryptedItem>, KeyholdError> {
        Ok(self.lock().items.clone())
    }

    async fn clear(&self) -> Result<(), KeyholdError> {
        self.check_writable()?;
        let mut contents = self.lock();
        contents.session = None;
        contents.items.clear();
        Ok(())
    }

    async fn save_auto_lock(&self, policy: &AutoLockPolicy) -> Result<(), KeyholdError> {
        self.check_writable()?;
        self.lock().auto_lock = Some(*policy);
        Ok(())
    }

    async fn load_auto_lock(&self) -> Result<Option<AutoLockPolicy>, KeyholdError> {
        Ok(self.lock().auto_lock)
    }
}
