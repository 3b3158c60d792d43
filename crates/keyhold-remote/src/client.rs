// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the vault server.
//!
//! [`RemoteClient`] implements [`RemoteStore`] over a JSON REST API with
//! bearer-token authentication and one retry on transient errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use keyhold_config::model::RemoteConfig;
use keyhold_core::types::{LoginSnapshot, MasterKeyUpdate, PreloginInfo, RegisterRequest};
use keyhold_core::{
    AdapterType, EncryptedItem, HealthStatus, KeyholdError, RemoteStore, StoreAdapter, Vault,
};

use crate::types::{
    ApiErrorResponse, ItemBody, LoginBody, LoginResponse, MasterKeyBody, PreloginRequest,
    PreloginResponse, RegisterBody, VaultBody, WireItem,
};

/// Client for the vault server REST API.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, KeyholdError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KeyholdError::Network {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request built by `build`, retrying once after 1 s on 429, 500
    /// or 503. `unauthorized` is the error returned for a 401.
    async fn send<F>(
        &self,
        label: &'static str,
        unauthorized: fn() -> KeyholdError,
        build: F,
    ) -> Result<Response, KeyholdError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, request = label, "retrying after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = build().send().await.map_err(|e| KeyholdError::Network {
                message: format!("{label}: HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

            let status = response.status();
            debug!(status = %status, attempt, request = label, "response received");

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED {
                return Err(unauthorized());
            }

            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => match api_err.message {
                    Some(detail) => format!("{label}: server error ({}): {detail}", api_err.error),
                    None => format!("{label}: server error ({})", api_err.error),
                },
                Err(_) => format!("{label}: server returned {status}"),
            };

            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, request = label, "transient error, will retry");
                last_error = Some(KeyholdError::network(message));
                continue;
            }

            return Err(KeyholdError::network(message));
        }

        Err(last_error
            .unwrap_or_else(|| KeyholdError::network(format!("{label}: failed after retries"))))
    }

    async fn send_json<T, F>(
        &self,
        label: &'static str,
        unauthorized: fn() -> KeyholdError,
        build: F,
    ) -> Result<T, KeyholdError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let response = self.send(label, unauthorized, build).await?;
        let body = response.text().await.map_err(|e| KeyholdError::Network {
            message: format!("{label}: failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&body).map_err(|e| KeyholdError::Network {
            message: format!("{label}: failed to parse response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

fn session_expired() -> KeyholdError {
    KeyholdError::NotAuthenticatedOrLocked
}

fn wrong_password() -> KeyholdError {
    KeyholdError::InvalidMasterPassword
}

/// Returns true for HTTP status codes worth one retry.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}

fn into_snapshot(response: LoginResponse) -> Result<LoginSnapshot, KeyholdError> {
    let items = response
        .items
        .into_iter()
        .map(WireItem::into_item)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LoginSnapshot {
        access_token: SecretString::from(response.access_token),
        user_id: response.user_id,
        email: response.email,
        salt: response.salt,
        wrapped_data_key: response.wrapped_data_key,
        vaults: response.vaults,
        items,
    })
}

fn remote_id(item: &EncryptedItem) -> Result<i64, KeyholdError> {
    item.id.ok_or_else(|| {
        KeyholdError::Internal(format!("item {} has no remote id yet", item.uuid))
    })
}

#[async_trait]
impl StoreAdapter for RemoteClient {
    fn name(&self) -> &str {
        "http"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Remote
    }

    async fn health_check(&self) -> Result<HealthStatus, KeyholdError> {
        match self.client.get(self.url("/health")).send().await {
            Ok(response) if response.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(response) => Ok(HealthStatus::Degraded(format!(
                "server returned {}",
                response.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl RemoteStore for RemoteClient {
    async fn prelogin(&self, email: &str) -> Result<PreloginInfo, KeyholdError> {
        let url = self.url("/auth/prelogin");
        let response: PreloginResponse = self
            .send_json("prelogin", session_expired, || {
                self.client.post(&url).json(&PreloginRequest { email })
            })
            .await?;
        Ok(PreloginInfo {
            salt: response.salt,
        })
    }

    async fn register(&self, request: RegisterRequest) -> Result<LoginSnapshot, KeyholdError> {
        let url = self.url("/auth/register");
        let response: LoginResponse = self
            .send_json("register", session_expired, || {
                self.client.post(&url).json(&RegisterBody {
                    email: &request.email,
                    salt: request.salt.clone(),
                    auth_proof: request.auth_proof.expose_secret(),
                    wrapped_data_key: request.wrapped_data_key.clone(),
                })
            })
            .await?;
        into_snapshot(response)
    }

    async fn login(
        &self,
        email: &str,
        auth_proof: &SecretString,
    ) -> Result<LoginSnapshot, KeyholdError> {
        let url = self.url("/auth/login");
        let response: LoginResponse = self
            .send_json("login", wrong_password, || {
                self.client.post(&url).json(&LoginBody {
                    email,
                    auth_proof: auth_proof.expose_secret(),
                })
            })
            .await?;
        into_snapshot(response)
    }

    async fn fetch_items(&self, token: &SecretString) -> Result<Vec<EncryptedItem>, KeyholdError> {
        let url = self.url("/items");
        let items: Vec<WireItem> = self
            .send_json("fetch items", session_expired, || {
                self.client.get(&url).bearer_auth(token.expose_secret())
            })
            .await?;
        items.into_iter().map(WireItem::into_item).collect()
    }

    async fn create_item(
        &self,
        token: &SecretString,
        item: &EncryptedItem,
    ) -> Result<EncryptedItem, KeyholdError> {
        let url = self.url("/items");
        let body = ItemBody::from(item);
        let created: WireItem = self
            .send_json("create item", session_expired, || {
                self.client
                    .post(&url)
                    .bearer_auth(token.expose_secret())
                    .json(&body)
            })
            .await?;
        created.into_item()
    }

    async fn update_item(
        &self,
        token: &SecretString,
        item: &EncryptedItem,
    ) -> Result<EncryptedItem, KeyholdError> {
        let url = self.url(&format!("/items/{}", remote_id(item)?));
        let body = ItemBody::from(item);
        let updated: WireItem = self
            .send_json("update item", session_expired, || {
                self.client
                    .put(&url)
                    .bearer_auth(token.expose_secret())
                    .json(&body)
            })
            .await?;
        updated.into_item()
    }

    async fn delete_item(&self, token: &SecretString, id: i64) -> Result<(), KeyholdError> {
        let url = self.url(&format!("/items/{id}"));
        self.send("delete item", session_expired, || {
            self.client.delete(&url).bearer_auth(token.expose_secret())
        })
        .await?;
        Ok(())
    }

    async fn list_vaults(&self, token: &SecretString) -> Result<Vec<Vault>, KeyholdError> {
        let url = self.url("/vaults");
        self.send_json("list vaults", session_expired, || {
            self.client.get(&url).bearer_auth(token.expose_secret())
        })
        .await
    }

    async fn create_vault(
        &self,
        token: &SecretString,
        name: &str,
        icon: Option<&str>,
    ) -> Result<Vault, KeyholdError> {
        let url = self.url("/vaults");
        self.send_json("create vault", session_expired, || {
            self.client
                .post(&url)
                .bearer_auth(token.expose_secret())
                .json(&VaultBody { name, icon })
        })
        .await
    }

    async fn update_vault(
        &self,
        token: &SecretString,
        vault: &Vault,
    ) -> Result<Vault, KeyholdError> {
        let url = self.url(&format!("/vaults/{}", vault.id));
        self.send_json("update vault", session_expired, || {
            self.client
                .put(&url)
                .bearer_auth(token.expose_secret())
                .json(&VaultBody {
                    name: &vault.name,
                    icon: vault.icon.as_deref(),
                })
        })
        .await
    }

    async fn delete_vault(&self, token: &SecretString, id: i64) -> Result<(), KeyholdError> {
        let url = self.url(&format!("/vaults/{id}"));
        self.send("delete vault", session_expired, || {
            self.client.delete(&url).bearer_auth(token.expose_secret())
        })
        .await?;
        Ok(())
    }

    async fn update_master_key(
        &self,
        token: &SecretString,
        update: MasterKeyUpdate,
    ) -> Result<(), KeyholdError> {
        let url = self.url("/account/master-key");
        self.send("update master key", session_expired, || {
            self.client
                .put(&url)
                .bearer_auth(token.expose_secret())
                .json(&MasterKeyBody {
                    salt: update.salt.clone(),
                    auth_proof: update.auth_proof.expose_secret(),
                    wrapped_data_key: update.wrapped_data_key.clone(),
                })
        })
        .await?;
        Ok(())
    }
}
