// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Volatile local storage for the exported data key.
//!
//! Only used when idle auto-lock is disabled by the user. Cleared on lock,
//! logout, and whenever auto-lock is re-enabled.

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::KeyholdError;
use crate::traits::adapter::StoreAdapter;

#[async_trait]
pub trait VolatileStore: StoreAdapter {
    /// Stores the exported data key, replacing any previous one.
    async fn store_key(&self, exported: &[u8]) -> Result<(), KeyholdError>;

    /// Loads the exported data key, if present.
    async fn load_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>, KeyholdError>;

    /// Removes the exported data key. Succeeds if nothing is stored.
    async fn clear(&self) -> Result<(), KeyholdError>;
}
