// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end request shapes against a mock vault server.

use chrono::Utc;
use keyhold_config::model::RemoteConfig;
use keyhold_core::types::{MasterKeyUpdate, RegisterRequest};
use keyhold_core::{EncryptedItem, ItemIdentifier, RemoteStore};
use keyhold_remote::RemoteClient;
use secrecy::SecretString;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RemoteClient {
    RemoteClient::new(&RemoteConfig {
        base_url: server.uri(),
        timeout_secs: 5,
    })
    .unwrap()
}

fn login_body() -> serde_json::Value {
    serde_json::json!({
        "access_token": "tok-abc",
        "user_id": "user-1",
        "email": "ada@example.com",
        "salt": "AAAAAAAAAAAAAAAAAAAAAA==",
        "wrapped_data_key": "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQ==",
        "vaults": [{"id": 1, "name": "Personal", "icon": "lock"}],
        "items": [
            {
                "id": 7,
                "vault_id": 1,
                "ciphertext": "3q2+7w==",
                "nonce": "AAAAAAAAAAAAAAAA",
                "created_at": "2026-01-01T00:00:00Z",
                "updated_at": "2026-01-02T00:00:00Z"
            }
        ]
    })
}

#[tokio::test]
async fn register_sends_only_derived_material() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .and(body_partial_json(serde_json::json!({
            "email": "ada@example.com",
            "auth_proof": "cHJvb2Y=",
            "salt": "AAAAAAAAAAAAAAAAAAAAAA=="
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(login_body()))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = client(&server)
        .register(RegisterRequest {
            email: "ada@example.com".into(),
            salt: vec![0u8; 16],
            auth_proof: SecretString::from("cHJvb2Y="),
            wrapped_data_key: vec![1u8; 40],
        })
        .await
        .unwrap();

    assert_eq!(snapshot.user_id, "user-1");
    assert_eq!(snapshot.wrapped_data_key, vec![1u8; 40]);
    assert_eq!(snapshot.vaults[0].icon.as_deref(), Some("lock"));
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].uuid, ItemIdentifier::Provisional(7));
}

#[tokio::test]
async fn create_then_update_item_round_trip() {
    let server = MockServer::start().await;
    let uuid = uuid::Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_partial_json(serde_json::json!({"uuid": uuid.to_string()})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 21,
            "uuid": uuid.to_string(),
            "vault_id": 1,
            "ciphertext": "AQID",
            "nonce": "AAAAAAAAAAAAAAAA",
            "created_at": "2026-03-01T00:00:00Z",
            "updated_at": "2026-03-01T00:00:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/items/21"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 21,
            "uuid": uuid.to_string(),
            "vault_id": 1,
            "ciphertext": "BAUG",
            "nonce": "AAAAAAAAAAAAAAAA",
            "created_at": "2026-03-01T00:00:00Z",
            "updated_at": "2026-03-02T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let token = SecretString::from("tok");
    let now = Utc::now();
    let local = EncryptedItem {
        id: None,
        uuid: ItemIdentifier::Stable(uuid),
        vault_id: 1,
        ciphertext: vec![1, 2, 3],
        nonce: vec![0u8; 12],
        created_at: now,
        updated_at: now,
    };

    let remote = client(&server);
    let created = remote.create_item(&token, &local).await.unwrap();
    assert_eq!(created.id, Some(21));
    assert_eq!(created.uuid, ItemIdentifier::Stable(uuid));

    let mut changed = created.clone();
    changed.ciphertext = vec![4, 5, 6];
    let updated = remote.update_item(&token, &changed).await.unwrap();
    assert_eq!(updated.ciphertext, vec![4, 5, 6]);
    assert!(updated.updated_at > created.updated_at);
}

#[tokio::test]
async fn update_without_remote_id_is_rejected_locally() {
    let server = MockServer::start().await;
    let now = Utc::now();
    let local = EncryptedItem {
        id: None,
        uuid: ItemIdentifier::new_stable(),
        vault_id: 1,
        ciphertext: vec![1],
        nonce: vec![0u8; 12],
        created_at: now,
        updated_at: now,
    };

    let result = client(&server)
        .update_item(&SecretString::from("tok"), &local)
        .await;
    assert!(result.is_err());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn master_key_update_uses_put() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/account/master-key"))
        .and(body_partial_json(serde_json::json!({"auth_proof": "bmV3"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .update_master_key(
            &SecretString::from("tok"),
            MasterKeyUpdate {
                salt: vec![2u8; 16],
                auth_proof: SecretString::from("bmV3"),
                wrapped_data_key: vec![3u8; 40],
            },
        )
        .await
        .unwrap();
}
