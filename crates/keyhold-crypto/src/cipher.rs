// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM sealing of records under the data key.
//!
//! Every [`seal`] draws a fresh random 96-bit nonce from the system CSPRNG.
//! Nonce reuse under one key would break GCM, so callers never supply one.

use keyhold_core::types::{EncryptedItem, Item, Record};
use keyhold_core::{KeyholdError, SealedBlob};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::keys::DataKey;

fn aead_key(key: &DataKey) -> Result<LessSafeKey, KeyholdError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key.bytes())
        .map_err(|_| KeyholdError::Crypto("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt plaintext under the data key with a random nonce.
pub fn seal(key: &DataKey, plaintext: &[u8]) -> Result<SealedBlob, KeyholdError> {
    let aead = aead_key(key)?;

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| KeyholdError::Crypto("failed to generate random nonce".to_string()))?;

    let mut in_out = plaintext.to_vec();
    aead.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| KeyholdError::Crypto("AES-256-GCM encryption failed".to_string()))?;

    Ok(SealedBlob {
        ciphertext: in_out,
        nonce: nonce_bytes,
    })
}

/// Decrypt a blob. Fails on a wrong key or any tampering.
pub fn open(key: &DataKey, blob: &SealedBlob) -> Result<Zeroizing<Vec<u8>>, KeyholdError> {
    let aead = aead_key(key)?;

    let mut in_out = Zeroizing::new(blob.ciphertext.clone());
    let len = aead
        .open_in_place(
            Nonce::assume_unique_for_key(blob.nonce),
            Aad::empty(),
            in_out.as_mut_slice(),
        )
        .map_err(|_| KeyholdError::Crypto("AES-256-GCM authentication failed".to_string()))?
        .len();
    in_out.truncate(len);
    Ok(in_out)
}

/// Serialize a value as JSON and seal it.
pub fn seal_json<T: Serialize>(key: &DataKey, value: &T) -> Result<SealedBlob, KeyholdError> {
    let json = Zeroizing::new(
        serde_json::to_vec(value).map_err(|e| KeyholdError::Internal(e.to_string()))?,
    );
    seal(key, &json)
}

/// Open a blob and parse its JSON contents.
pub fn open_json<T: DeserializeOwned>(key: &DataKey, blob: &SealedBlob) -> Result<T, KeyholdError> {
    let plaintext = open(key, blob)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| KeyholdError::Crypto(format!("sealed payload is malformed: {e}")))
}

/// Serialize a record as JSON and seal it.
pub fn encrypt_record(key: &DataKey, record: &Record) -> Result<SealedBlob, KeyholdError> {
    seal_json(key, record)
}

/// Encrypt the item's record; the envelope fields stay in plaintext.
pub fn encrypt_item(key: &DataKey, item: &Item) -> Result<EncryptedItem, KeyholdError> {
    let blob = encrypt_record(key, &item.record)?;
    Ok(EncryptedItem {
        id: item.id,
        uuid: item.uuid.clone(),
        vault_id: item.vault_id,
        ciphertext: blob.ciphertext,
        nonce: blob.nonce.to_vec(),
        created_at: item.created_at,
        updated_at: item.updated_at,
    })
}

/// Decrypt one item. Every failure names the item and nothing else, so one
/// bad record can be skipped without failing the whole listing.
pub fn decrypt_item(key: &DataKey, encrypted: &EncryptedItem) -> Result<Item, KeyholdError> {
    let failed = || KeyholdError::Decryption {
        item: encrypted.uuid.to_string(),
    };
    let nonce: [u8; NONCE_LEN] = encrypted
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| failed())?;
    let blob = SealedBlob {
        ciphertext: encrypted.ciphertext.clone(),
        nonce,
    };
    let record: Record = open_json(key, &blob).map_err(|_| failed())?;

    Ok(Item {
        id: encrypted.id,
        uuid: encrypted.uuid.clone(),
        vault_id: encrypted.vault_id,
        created_at: encrypted.created_at,
        updated_at: encrypted.updated_at,
        record,
    })
}
