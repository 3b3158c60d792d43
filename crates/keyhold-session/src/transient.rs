// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Page-lifetime store for a single pending handoff.

use async_trait::async_trait;
use tokio::sync::Mutex;

use keyhold_core::{
    AdapterType, HealthStatus, KeyholdError, PendingHandoff, StoreAdapter, TransientStore,
};

/// Holds at most one pending handoff in process memory.
#[derive(Default)]
pub struct MemoryTransientStore {
    slot: Mutex<Option<PendingHandoff>>,
}

impl MemoryTransientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreAdapter for MemoryTransientStore {
    fn name(&self) -> &str {
        "memory-transient"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transient
    }

    async fn health_check(&self) -> Result<HealthStatus, KeyholdError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl TransientStore for MemoryTransientStore {
    async fn put(&self, pending: PendingHandoff) -> Result<(), KeyholdError> {
        *self.slot.lock().await = Some(pending);
        Ok(())
    }

    async fn take(&self) -> Result<Option<PendingHandoff>, KeyholdError> {
        Ok(self.slot.lock().await.take())
    }
}
