// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote store client for the Keyhold vault server.
//!
//! The server only ever sees derived material: the salt, the auth proof, the
//! wrapped data key and item ciphertext.

pub mod client;
pub mod types;

pub use client::RemoteClient;
