// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Keyhold vault client.
//!
//! Provides the error taxonomy, the data model shared by every crate, and the
//! adapter traits for the remote store and the local durable, volatile, and
//! transient stores.

pub mod encoding;
pub mod error;
pub mod traits;
pub mod types;

pub use error::KeyholdError;
pub use types::{
    AdapterType, EncryptedItem, HealthStatus, Item, ItemIdentifier, PendingHandoff, Record,
    SealedBlob, SessionShell, SessionState, StateUpdate, Vault,
};

pub use traits::{DurableStore, RemoteStore, StoreAdapter, TransientStore, VolatileStore};
