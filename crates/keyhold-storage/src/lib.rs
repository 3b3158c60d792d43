// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local persistence for the Keyhold vault client.
//!
//! The durable store is a WAL-mode SQLite cache with embedded migrations,
//! written through `tokio-rusqlite`'s single background thread. The volatile
//! stores hold the exported data key when auto-lock is disabled.

pub mod database;
pub mod durable;
pub mod migrations;
pub mod volatile;

pub use database::Database;
pub use durable::SqliteDurableStore;
pub use volatile::{MemoryVolatileStore, RuntimeDirVolatileStore};
