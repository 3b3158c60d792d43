// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end session tests.
//!
//! `TestHarness` wires a [`SessionMachine`] to the mock remote, a temp
//! SQLite durable store and a runtime-dir volatile store in the same temp
//! directory. [`TestHarness::reopen`] builds a second machine over the same
//! files to exercise the restart contract.

use std::path::PathBuf;
use std::sync::Arc;

use keyhold_config::model::KdfConfig;
use keyhold_config::KeyholdConfig;
use keyhold_core::KeyholdError;
use keyhold_session::{HandoffProtocol, SessionMachine};
use keyhold_storage::{RuntimeDirVolatileStore, SqliteDurableStore};

use crate::mock_remote::MockRemoteStore;

/// Cheap Argon2id parameters so tests do not spend seconds per derivation.
pub fn test_kdf_config() -> KdfConfig {
    KdfConfig {
        memory_cost_kib: 8 * 1024,
        iterations: 1,
        parallelism: 1,
        fallback_iterations: 310_000,
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    auto_lock: bool,
    idle_timeout_secs: u64,
    persist_key_without_auto_lock: bool,
    disabled_sites: Vec<String>,
    remote: Option<Arc<MockRemoteStore>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            auto_lock: true,
            idle_timeout_secs: 60,
            persist_key_without_auto_lock: true,
            disabled_sites: Vec::new(),
            remote: None,
        }
    }

    pub fn with_auto_lock(mut self, enabled: bool) -> Self {
        self.auto_lock = enabled;
        self
    }

    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    pub fn with_persist_key_without_auto_lock(mut self, persist: bool) -> Self {
        self.persist_key_without_auto_lock = persist;
        self
    }

    pub fn with_disabled_sites(mut self, sites: &[&str]) -> Self {
        self.disabled_sites = sites.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Share a mock remote between harnesses (two devices, one account).
    pub fn with_remote(mut self, remote: Arc<MockRemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Build the harness. Nothing is logged in yet.
    pub async fn build(self) -> Result<TestHarness, KeyholdError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| KeyholdError::Storage { source: e.into() })?;

        let mut config = KeyholdConfig::default();
        config.kdf = test_kdf_config();
        config.session.auto_lock = self.auto_lock;
        config.session.idle_timeout_secs = self.idle_timeout_secs;
        config.session.persist_key_without_auto_lock = self.persist_key_without_auto_lock;
        config.handoff.disabled_sites = self.disabled_sites;
        config.storage.database_path = temp_dir
            .path()
            .join("cache.db")
            .to_string_lossy()
            .into_owned();
        config.storage.volatile_dir = Some(temp_dir.path().join("run").to_string_lossy().into_owned());

        let remote = self
            .remote
            .unwrap_or_else(|| Arc::new(MockRemoteStore::new()));
        let session = open_session(&config, remote.clone()).await?;

        Ok(TestHarness {
            session,
            remote,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// Fully wired session over temp storage and the mock remote.
pub struct TestHarness {
    pub session: SessionMachine,
    pub remote: Arc<MockRemoteStore>,
    pub config: KeyholdConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A fresh machine over the same database and runtime directory, as a
    /// restarted process would see them. `restore` has not been called.
    pub async fn reopen(&self) -> Result<SessionMachine, KeyholdError> {
        open_session(&self.config, self.remote.clone()).await
    }

    pub fn handoff(&self) -> HandoffProtocol {
        HandoffProtocol::new(self.session.clone(), &self.config.handoff)
    }

    /// Directory holding the volatile key file.
    pub fn volatile_dir(&self) -> PathBuf {
        PathBuf::from(self.config.storage.volatile_dir.clone().unwrap_or_default())
    }
}

async fn open_session(
    config: &KeyholdConfig,
    remote: Arc<MockRemoteStore>,
) -> Result<SessionMachine, KeyholdError> {
    let durable = SqliteDurableStore::open(&config.storage).await?;
    let volatile = RuntimeDirVolatileStore::from_config(config.storage.volatile_dir.as_deref())?;
    Ok(SessionMachine::new(
        config,
        remote,
        Arc::new(durable),
        Arc::new(volatile),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyhold_core::SessionState;
    use secrecy::SecretString;

    #[tokio::test]
    async fn harness_starts_without_session() {
        let harness = TestHarness::builder().build().await.unwrap();
        assert_eq!(harness.session.state().await, SessionState::NoSession);
        assert_eq!(harness.session.restore().await.unwrap(), SessionState::NoSession);
    }

    #[tokio::test]
    async fn reopened_machine_sees_stored_shell() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness
            .session
            .register("ada@example.com", &SecretString::from("pw"))
            .await
            .unwrap();

        let reopened = harness.reopen().await.unwrap();
        assert_eq!(reopened.restore().await.unwrap(), SessionState::Locked);
        assert_eq!(
            reopened.shell().await.unwrap().email,
            "ada@example.com".to_string()
        );
    }
}
