// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitives for the Keyhold vault client.
//!
//! Uses a key-wrapping pattern: a random data key encrypts every record with
//! AES-256-GCM, and the data key itself is wrapped (AES-KW) by a key derived
//! from the master password via Argon2id and HKDF. Unwrapping is the only
//! password check; no password hash exists anywhere.

pub mod cipher;
pub mod kdf;
pub mod keys;
pub mod keywrap;

pub use cipher::{decrypt_item, encrypt_item, encrypt_record, open, open_json, seal, seal_json};
pub use kdf::{derive, derive_keys, generate_salt, SALT_LEN};
pub use keys::{AuthKey, DataKey, DerivedKeys, WrappingKey};
pub use keywrap::{unwrap, wrap, WRAPPED_KEY_LEN};
