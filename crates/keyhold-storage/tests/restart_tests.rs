// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data written by one process is readable by the next.

use chrono::Utc;
use keyhold_config::model::StorageConfig;
use keyhold_core::types::PersistedSession;
use keyhold_core::{DurableStore, EncryptedItem, ItemIdentifier, SessionShell};
use keyhold_storage::SqliteDurableStore;
use secrecy::{ExposeSecret, SecretString};
use tempfile::tempdir;

fn config(path: &std::path::Path) -> StorageConfig {
    StorageConfig {
        database_path: path.to_string_lossy().into_owned(),
        wal_mode: true,
        volatile_dir: None,
    }
}

#[tokio::test]
async fn shell_and_items_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let uuid = ItemIdentifier::new_stable();

    {
        let store = SqliteDurableStore::open(&config(&path)).await.unwrap();
        store
            .save_session(&PersistedSession {
                shell: SessionShell {
                    user_id: "u-1".into(),
                    email: "ada@example.com".into(),
                    vaults: vec![],
                    salt: vec![3u8; 16],
                    wrapped_data_key: vec![4u8; 40],
                },
                access_token: SecretString::from("bearer"),
            })
            .await
            .unwrap();
        store
            .save_items(&[EncryptedItem {
                id: Some(11),
                uuid: uuid.clone(),
                vault_id: 2,
                ciphertext: vec![0xde, 0xad],
                nonce: vec![1u8; 12],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }])
            .await
            .unwrap();
        store.database().checkpoint().await.unwrap();
    }

    let store = SqliteDurableStore::open(&config(&path)).await.unwrap();
    let session = store.load_session().await.unwrap().unwrap();
    assert_eq!(session.shell.email, "ada@example.com");
    assert_eq!(session.shell.wrapped_data_key, vec![4u8; 40]);
    assert_eq!(session.access_token.expose_secret(), "bearer");

    let items = store.load_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].uuid, uuid);
    assert_eq!(items[0].id, Some(11));
    assert_eq!(items[0].ciphertext, vec![0xde, 0xad]);
}
