// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Volatile stores for the exported data key.
//!
//! Only used when auto-lock is disabled. Contents must not outlive the login
//! session of the OS user: [`RuntimeDirVolatileStore`] writes under
//! `$XDG_RUNTIME_DIR`, which the OS clears on logout.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

use keyhold_core::{AdapterType, HealthStatus, KeyholdError, StoreAdapter, VolatileStore};

const KEY_FILE_NAME: &str = "data-key";

/// Process-memory volatile store. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryVolatileStore {
    key: Mutex<Option<Zeroizing<Vec<u8>>>>,
}

impl MemoryVolatileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreAdapter for MemoryVolatileStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Volatile
    }

    async fn health_check(&self) -> Result<HealthStatus, KeyholdError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl VolatileStore for MemoryVolatileStore {
    async fn store_key(&self, exported: &[u8]) -> Result<(), KeyholdError> {
        *self.key.lock().await = Some(Zeroizing::new(exported.to_vec()));
        Ok(())
    }

    async fn load_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>, KeyholdError> {
        Ok(self.key.lock().await.clone())
    }

    async fn clear(&self) -> Result<(), KeyholdError> {
        self.key.lock().await.take();
        Ok(())
    }
}

/// File-backed volatile store in the per-user runtime directory.
pub struct RuntimeDirVolatileStore {
    dir: PathBuf,
}

impl RuntimeDirVolatileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `configured` if set, otherwise `$XDG_RUNTIME_DIR/keyhold`.
    pub fn from_config(configured: Option<&str>) -> Result<Self, KeyholdError> {
        let dir = match configured {
            Some(dir) => PathBuf::from(dir),
            None => dirs::runtime_dir()
                .map(|d| d.join("keyhold"))
                .ok_or_else(|| {
                    KeyholdError::Config(
                        "no runtime directory available; set storage.volatile_dir".to_string(),
                    )
                })?,
        };
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE_NAME)
    }
}

#[async_trait]
impl StoreAdapter for RuntimeDirVolatileStore {
    fn name(&self) -> &str {
        "runtime-dir"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Volatile
    }

    async fn health_check(&self) -> Result<HealthStatus, KeyholdError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Unhealthy(format!(
                "{} is not a directory",
                self.dir.display()
            ))),
            Err(_) => Ok(HealthStatus::Degraded(format!(
                "{} does not exist yet",
                self.dir.display()
            ))),
        }
    }
}

#[async_trait]
impl VolatileStore for RuntimeDirVolatileStore {
    async fn store_key(&self, exported: &[u8]) -> Result<(), KeyholdError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(storage_err)?;
        restrict_permissions(&self.dir, 0o700).await?;

        let path = self.key_path();
        // Create empty and restrict before the key bytes land.
        tokio::fs::write(&path, b"").await.map_err(storage_err)?;
        restrict_permissions(&path, 0o600).await?;
        tokio::fs::write(&path, exported).await.map_err(storage_err)?;

        debug!(dir = %self.dir.display(), "data key written to runtime directory");
        Ok(())
    }

    async fn load_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>, KeyholdError> {
        match tokio::fs::read(self.key_path()).await {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn clear(&self) -> Result<(), KeyholdError> {
        match tokio::fs::remove_file(self.key_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(e)),
        }
    }
}

fn storage_err(e: std::io::Error) -> KeyholdError {
    KeyholdError::Storage {
        source: Box::new(e),
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) -> Result<(), KeyholdError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(storage_err)
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), KeyholdError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_round_trip_and_clear() {
        let store = MemoryVolatileStore::new();
        assert!(store.load_key().await.unwrap().is_none());

        store.store_key(&[5u8; 32]).await.unwrap();
        assert_eq!(*store.load_key().await.unwrap().unwrap(), vec![5u8; 32]);

        store.clear().await.unwrap();
        assert!(store.load_key().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn runtime_dir_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = RuntimeDirVolatileStore::new(dir.path().join("keyhold"));

        assert!(store.load_key().await.unwrap().is_none());
        store.store_key(&[1u8; 32]).await.unwrap();
        assert_eq!(*store.load_key().await.unwrap().unwrap(), vec![1u8; 32]);

        store.clear().await.unwrap();
        assert!(store.load_key().await.unwrap().is_none());
        // Clearing twice is fine.
        store.clear().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = RuntimeDirVolatileStore::new(dir.path().join("keyhold"));
        store.store_key(&[2u8; 32]).await.unwrap();

        let mode = std::fs::metadata(store.key_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn explicit_dir_overrides_runtime_dir() {
        let store = RuntimeDirVolatileStore::from_config(Some("/tmp/keyhold-test")).unwrap();
        assert_eq!(store.dir(), Path::new("/tmp/keyhold-test"));
    }
}
