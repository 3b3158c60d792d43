// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Page-lifetime storage visible to the untrusted page context.

use async_trait::async_trait;

use crate::error::KeyholdError;
use crate::traits::adapter::StoreAdapter;
use crate::types::PendingHandoff;

/// Holds at most one pending handoff. Never durable.
#[async_trait]
pub trait TransientStore: StoreAdapter {
    /// Stores the pending handoff, replacing any previous one.
    async fn put(&self, pending: PendingHandoff) -> Result<(), KeyholdError>;

    /// Removes and returns the pending handoff (consume-once).
    async fn take(&self) -> Result<Option<PendingHandoff>, KeyholdError>;
}
