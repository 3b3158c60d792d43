// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Keyhold integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a vault server.
//!
//! # Components
//!
//! - [`MockRemoteStore`] - In-memory vault server with failure injection
//! - [`MemoryDurableStore`] - Durable store backed by process memory
//! - [`TestHarness`] - Session wired to temp SQLite and the mock remote

pub mod harness;
pub mod mock_durable;
pub mod mock_remote;

pub use harness::{test_kdf_config, TestHarness, TestHarnessBuilder};
pub use mock_durable::MemoryDurableStore;
pub use mock_remote::MockRemoteStore;
