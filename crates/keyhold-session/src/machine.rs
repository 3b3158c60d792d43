// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session and key lifecycle state machine.
//!
//! All session state sits behind one mutex. Slow work (key derivation,
//! remote calls) runs with the mutex released and is tagged with the state
//! it started from:
//!
//! - `generation` guards key installation. `lock`, `logout` and `login` bump
//!   it, so an unlock racing an idle lock loses and a logout turns an
//!   in-flight login into a no-op.
//! - `serial` identifies one logged-in session. Shell and item mutations
//!   commit only while it is unchanged.
//!
//! Lock order is session state first, item cache second.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use keyhold_config::model::{KdfConfig, KeyholdConfig};
use keyhold_core::types::{
    AutoLockPolicy, LoginSnapshot, MasterKeyUpdate, PersistedSession, RegisterRequest,
};
use keyhold_core::{
    DurableStore, EncryptedItem, Item, ItemIdentifier, KeyholdError, RemoteStore, SessionShell,
    SessionState, StateUpdate, Vault, VolatileStore,
};
use keyhold_crypto::{DataKey, DerivedKeys};

use crate::broadcast::{ObserverId, StateBroadcaster};
use crate::cache::ItemCache;
use crate::idle::{self, IdleSnapshot, IdleTarget, IdleTimer};

struct Inner {
    generation: u64,
    serial: u64,
    shell: Option<SessionShell>,
    token: Option<Arc<SecretString>>,
    data_key: Option<Arc<DataKey>>,
    auto_lock: bool,
    idle_timeout: Duration,
    persist_key_without_auto_lock: bool,
    last_activity: Instant,
}

impl Inner {
    fn state(&self) -> SessionState {
        match (&self.shell, &self.data_key) {
            (None, _) => SessionState::NoSession,
            (Some(_), None) => SessionState::Locked,
            (Some(_), Some(_)) => SessionState::Unlocked,
        }
    }

    fn update(&self) -> StateUpdate {
        StateUpdate {
            shell: self.shell.clone(),
            is_locked: self.data_key.is_none(),
        }
    }

    fn keeps_volatile_key(&self) -> bool {
        !self.auto_lock && self.persist_key_without_auto_lock
    }
}

/// Key, token and session serial captured for one authorized operation.
struct Authorized {
    data_key: Arc<DataKey>,
    token: Arc<SecretString>,
    serial: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    remote: Arc<dyn RemoteStore>,
    durable: Arc<dyn DurableStore>,
    volatile: Arc<dyn VolatileStore>,
    cache: ItemCache,
    broadcaster: StateBroadcaster,
    kdf: KdfConfig,
    timer: IdleTimer,
}

impl Shared {
    /// Drop the key and clear the volatile copy. Returns whether the state
    /// changed.
    async fn lock_now(&self, inner: &mut Inner) -> (bool, Result<(), KeyholdError>) {
        inner.generation += 1;
        let was_unlocked = inner.data_key.take().is_some();
        let cleared = self.volatile.clear().await;
        (was_unlocked, cleared)
    }
}

#[async_trait]
impl IdleTarget for Shared {
    async fn idle_snapshot(&self) -> IdleSnapshot {
        let inner = self.inner.lock().await;
        IdleSnapshot {
            auto_lock: inner.auto_lock,
            unlocked: inner.data_key.is_some(),
            timeout: inner.idle_timeout,
            last_activity: inner.last_activity,
        }
    }

    async fn lock_for_idle(&self, observed_activity: Instant) {
        let mut inner = self.inner.lock().await;
        if inner.last_activity != observed_activity
            || !inner.auto_lock
            || inner.data_key.is_none()
        {
            return;
        }
        let (_, cleared) = self.lock_now(&mut inner).await;
        if let Err(err) = cleared {
            warn!(error = %err, "failed to clear volatile key on idle lock");
        }
        let update = inner.update();
        drop(inner);

        self.broadcaster.publish(update);
        info!("vault locked after idle timeout");
    }
}

/// The client session. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionMachine {
    shared: Arc<Shared>,
}

impl SessionMachine {
    pub fn new(
        config: &KeyholdConfig,
        remote: Arc<dyn RemoteStore>,
        durable: Arc<dyn DurableStore>,
        volatile: Arc<dyn VolatileStore>,
    ) -> Self {
        let inner = Inner {
            generation: 0,
            serial: 0,
            shell: None,
            token: None,
            data_key: None,
            auto_lock: config.session.auto_lock,
            idle_timeout: idle::effective_timeout(Duration::from_secs(
                config.session.idle_timeout_secs,
            )),
            persist_key_without_auto_lock: config.session.persist_key_without_auto_lock,
            last_activity: Instant::now(),
        };
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                cache: ItemCache::new(remote.clone(), durable.clone()),
                remote,
                durable,
                volatile,
                broadcaster: StateBroadcaster::new(),
                kdf: config.kdf.clone(),
                timer: IdleTimer::default(),
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.shared.inner.lock().await.state()
    }

    /// The non-secret session projection, if logged in.
    pub async fn shell(&self) -> Option<SessionShell> {
        self.shared.inner.lock().await.shell.clone()
    }

    /// Current auto-lock setting and effective idle timeout.
    pub async fn auto_lock(&self) -> (bool, Duration) {
        let inner = self.shared.inner.lock().await;
        (inner.auto_lock, inner.idle_timeout)
    }

    /// Observe state updates; the receiver always holds the newest one.
    pub fn subscribe(&self) -> (ObserverId, watch::Receiver<StateUpdate>) {
        self.shared.broadcaster.subscribe()
    }

    pub fn unsubscribe(&self, id: &ObserverId) {
        self.shared.broadcaster.unsubscribe(id);
    }

    /// Record user activity for the idle timer.
    pub async fn touch(&self) {
        self.shared.inner.lock().await.last_activity = Instant::now();
    }

    /// Number of cached (encrypted) items.
    pub async fn item_count(&self) -> usize {
        self.shared.cache.len().await
    }

    /// Create an account and log into it.
    pub async fn register(&self, email: &str, password: &SecretString) -> Result<(), KeyholdError> {
        let generation = self.begin_login().await?;

        let salt = keyhold_crypto::generate_salt()?.to_vec();
        let data_key = DataKey::generate()?;
        let keys = self.derive(password, salt.clone()).await?;
        let wrapped_data_key = keyhold_crypto::wrap(&keys.wrapping, &data_key)?;

        let snapshot = self
            .shared
            .remote
            .register(RegisterRequest {
                email: email.to_string(),
                salt,
                auth_proof: keys.auth.to_proof(),
                wrapped_data_key,
            })
            .await?;
        info!(email, "account registered");

        self.install(generation, snapshot, data_key).await
    }

    /// Authenticate against the remote and unwrap the data key locally.
    ///
    /// Replaces whatever session existed before. If the returned key does
    /// not unwrap, the machine falls back to `NoSession`.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<(), KeyholdError> {
        let generation = self.begin_login().await?;

        let prelogin = self.shared.remote.prelogin(email).await?;
        let keys = self.derive(password, prelogin.salt).await?;
        let snapshot = self
            .shared
            .remote
            .login(email, &keys.auth.to_proof())
            .await?;

        let data_key = match keyhold_crypto::unwrap(&keys.wrapping, &snapshot.wrapped_data_key) {
            Ok(key) => key,
            Err(err) => {
                warn!(email, "login returned a key that does not unwrap");
                self.roll_back(generation).await;
                return Err(err);
            }
        };

        self.install(generation, snapshot, data_key).await
    }

    /// Re-derive the wrapping key and unwrap the data key from the shell.
    pub async fn unlock(&self, password: &SecretString) -> Result<(), KeyholdError> {
        let (generation, salt, wrapped) = {
            let inner = self.shared.inner.lock().await;
            match (inner.state(), &inner.shell) {
                (SessionState::Unlocked, _) => return Ok(()),
                (_, Some(shell)) => (
                    inner.generation,
                    shell.salt.clone(),
                    shell.wrapped_data_key.clone(),
                ),
                (_, None) => return Err(KeyholdError::NotAuthenticatedOrLocked),
            }
        };

        let keys = self.derive(password, salt).await?;
        let data_key = keyhold_crypto::unwrap(&keys.wrapping, &wrapped).inspect_err(|_| {
            warn!("unlock rejected");
        })?;

        let mut inner = self.shared.inner.lock().await;
        if inner.generation != generation {
            debug!(generation, "unlock superseded, discarding key");
            return Err(KeyholdError::NotAuthenticatedOrLocked);
        }
        let data_key = Arc::new(data_key);
        if inner.keeps_volatile_key() {
            self.shared.volatile.store_key(&data_key.export()).await?;
        }
        inner.data_key = Some(data_key);
        inner.last_activity = Instant::now();
        let update = inner.update();
        drop(inner);

        self.shared.broadcaster.publish(update);
        self.arm_idle();
        info!("vault unlocked");
        Ok(())
    }

    /// Drop the data key from memory. Idempotent.
    pub async fn lock(&self) -> Result<(), KeyholdError> {
        let mut inner = self.shared.inner.lock().await;
        let (changed, cleared) = self.shared.lock_now(&mut inner).await;
        let update = inner.update();
        drop(inner);

        if changed {
            self.shared.broadcaster.publish(update);
            info!("vault locked");
        }
        cleared
    }

    /// End the session and purge everything stored for it.
    pub async fn logout(&self) -> Result<(), KeyholdError> {
        let mut inner = self.shared.inner.lock().await;
        inner.generation += 1;
        let result = self.reset(&mut inner).await;
        let update = inner.update();
        drop(inner);

        self.shared.broadcaster.publish(update);
        info!("logged out");
        result
    }

    /// Rebuild the session from local storage after a restart.
    ///
    /// Resumes `Unlocked` only when auto-lock is off and the volatile store
    /// still holds the exported key; otherwise `Locked`.
    pub async fn restore(&self) -> Result<SessionState, KeyholdError> {
        let mut inner = self.shared.inner.lock().await;
        self.apply_stored_policy(&mut inner).await?;
        let Some(persisted) = self.shared.durable.load_session().await? else {
            self.shared.volatile.clear().await?;
            debug!("no stored session");
            return Ok(SessionState::NoSession);
        };
        let count = self.shared.cache.load_from_durable().await?;

        inner.generation += 1;
        inner.serial += 1;
        inner.shell = Some(persisted.shell);
        inner.token = Some(Arc::new(persisted.access_token));
        inner.data_key = None;
        inner.last_activity = Instant::now();

        if inner.keeps_volatile_key() {
            if let Some(exported) = self.shared.volatile.load_key().await? {
                match DataKey::from_exported(&exported) {
                    Ok(key) => inner.data_key = Some(Arc::new(key)),
                    Err(err) => {
                        warn!(error = %err, "discarding unusable volatile key");
                        self.shared.volatile.clear().await?;
                    }
                }
            }
        } else {
            self.shared.volatile.clear().await?;
        }

        let state = inner.state();
        let update = inner.update();
        drop(inner);

        self.shared.broadcaster.publish(update);
        self.arm_idle();
        info!(%state, items = count, "session restored");
        Ok(state)
    }

    /// Change the idle auto-lock policy. `timeout` below 30 s is raised.
    ///
    /// The policy is written to the durable store first and outlives
    /// restarts and logouts.
    pub async fn set_auto_lock(
        &self,
        enabled: bool,
        timeout: Option<Duration>,
    ) -> Result<(), KeyholdError> {
        let mut inner = self.shared.inner.lock().await;
        let idle_timeout = timeout.map_or(inner.idle_timeout, idle::effective_timeout);
        self.shared
            .durable
            .save_auto_lock(&AutoLockPolicy {
                enabled,
                idle_timeout_secs: idle_timeout.as_secs(),
            })
            .await?;

        inner.auto_lock = enabled;
        inner.idle_timeout = idle_timeout;
        inner.last_activity = Instant::now();

        let result = match (&inner.data_key, inner.keeps_volatile_key()) {
            (Some(key), true) => self.shared.volatile.store_key(&key.export()).await,
            (None, true) => Ok(()),
            (_, false) => self.shared.volatile.clear().await,
        };
        let timeout_secs = inner.idle_timeout.as_secs();
        drop(inner);

        self.arm_idle();
        info!(enabled, timeout_secs, "auto-lock updated");
        result
    }

    /// Re-wrap the data key under a new password. Items are untouched.
    pub async fn change_master_password(
        &self,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), KeyholdError> {
        let auth = self.authorized().await?;
        let (salt, wrapped) = {
            let inner = self.shared.inner.lock().await;
            let shell = inner
                .shell
                .as_ref()
                .ok_or(KeyholdError::NotAuthenticatedOrLocked)?;
            (shell.salt.clone(), shell.wrapped_data_key.clone())
        };

        let current_keys = self.derive(current, salt).await?;
        let data_key = keyhold_crypto::unwrap(&current_keys.wrapping, &wrapped)?;

        let new_salt = keyhold_crypto::generate_salt()?.to_vec();
        let new_keys = self.derive(new, new_salt.clone()).await?;
        let new_wrapped = keyhold_crypto::wrap(&new_keys.wrapping, &data_key)?;

        self.shared
            .remote
            .update_master_key(
                &auth.token,
                MasterKeyUpdate {
                    salt: new_salt.clone(),
                    auth_proof: new_keys.auth.to_proof(),
                    wrapped_data_key: new_wrapped.clone(),
                },
            )
            .await?;

        let mut inner = self.shared.inner.lock().await;
        if inner.serial != auth.serial {
            return Err(KeyholdError::NotAuthenticatedOrLocked);
        }
        if let Some(shell) = inner.shell.as_mut() {
            shell.salt = new_salt;
            shell.wrapped_data_key = new_wrapped;
        }
        self.persist_session(&inner).await?;
        let update = inner.update();
        drop(inner);

        self.shared.broadcaster.publish(update);
        info!("master password changed");
        Ok(())
    }

    pub async fn create_vault(&self, name: &str, icon: Option<&str>) -> Result<Vault, KeyholdError> {
        let auth = self.authorized().await?;
        let vault = self.shared.remote.create_vault(&auth.token, name, icon).await?;
        self.refresh_vaults(&auth).await?;
        info!(vault = vault.id, "vault created");
        Ok(vault)
    }

    pub async fn rename_vault(&self, id: i64, name: &str) -> Result<Vault, KeyholdError> {
        let auth = self.authorized().await?;
        let icon = self
            .shell()
            .await
            .and_then(|shell| shell.vaults.into_iter().find(|v| v.id == id))
            .and_then(|vault| vault.icon);
        let vault = self
            .shared
            .remote
            .update_vault(
                &auth.token,
                &Vault {
                    id,
                    name: name.to_string(),
                    icon,
                },
            )
            .await?;
        self.refresh_vaults(&auth).await?;
        Ok(vault)
    }

    /// Delete a vault. The remote drops its items too, so the item set is
    /// reconciled afterwards.
    pub async fn delete_vault(&self, id: i64) -> Result<(), KeyholdError> {
        let auth = self.authorized().await?;
        self.shared.remote.delete_vault(&auth.token, id).await?;
        self.refresh_vaults(&auth).await?;
        self.reconcile(&auth).await?;
        info!(vault = id, "vault deleted");
        Ok(())
    }

    /// Decrypt every cached item. One bad record does not fail the rest.
    pub async fn items(&self) -> Result<Vec<Result<Item, KeyholdError>>, KeyholdError> {
        let auth = self.authorized().await?;
        let encrypted = self.shared.cache.get_all().await;
        Ok(encrypted
            .iter()
            .map(|item| {
                keyhold_crypto::decrypt_item(&auth.data_key, item).inspect_err(|err| {
                    warn!(error = %err, "skipping undecryptable item");
                })
            })
            .collect())
    }

    /// Encrypt and write an item through to the remote and local stores.
    pub async fn save_item(&self, mut item: Item) -> Result<Item, KeyholdError> {
        let auth = self.authorized().await?;
        if item.id.is_some() {
            item.updated_at = Utc::now();
        }
        let encrypted = keyhold_crypto::encrypt_item(&auth.data_key, &item)?;
        let stored = self.shared.cache.upsert(&auth.token, encrypted).await?;
        Ok(Item {
            id: stored.id,
            uuid: stored.uuid,
            vault_id: stored.vault_id,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            record: item.record,
        })
    }

    /// Returns `false` when no such item is cached.
    pub async fn delete_item(&self, id: &ItemIdentifier) -> Result<bool, KeyholdError> {
        let auth = self.authorized().await?;
        self.shared.cache.remove(&auth.token, id).await
    }

    /// Replace the local item set with the remote one.
    pub async fn sync(&self) -> Result<usize, KeyholdError> {
        let auth = self.authorized().await?;
        self.reconcile(&auth).await
    }

    pub(crate) fn cache(&self) -> &ItemCache {
        &self.shared.cache
    }

    /// Data key and session serial, without counting as activity.
    pub(crate) async fn unlocked_key(&self) -> Option<(Arc<DataKey>, u64)> {
        let inner = self.shared.inner.lock().await;
        inner
            .data_key
            .as_ref()
            .map(|key| (key.clone(), inner.serial))
    }

    async fn authorized(&self) -> Result<Authorized, KeyholdError> {
        let mut inner = self.shared.inner.lock().await;
        let (Some(data_key), Some(token)) = (&inner.data_key, &inner.token) else {
            return Err(KeyholdError::NotAuthenticatedOrLocked);
        };
        let auth = Authorized {
            data_key: data_key.clone(),
            token: token.clone(),
            serial: inner.serial,
        };
        inner.last_activity = Instant::now();
        Ok(auth)
    }

    async fn begin_login(&self) -> Result<u64, KeyholdError> {
        let mut inner = self.shared.inner.lock().await;
        inner.generation += 1;
        self.apply_stored_policy(&mut inner).await?;
        Ok(inner.generation)
    }

    /// Replace the configured auto-lock defaults with the user's saved choice.
    async fn apply_stored_policy(&self, inner: &mut Inner) -> Result<(), KeyholdError> {
        if let Some(policy) = self.shared.durable.load_auto_lock().await? {
            inner.auto_lock = policy.enabled;
            inner.idle_timeout =
                idle::effective_timeout(Duration::from_secs(policy.idle_timeout_secs));
        }
        Ok(())
    }

    async fn derive(
        &self,
        password: &SecretString,
        salt: Vec<u8>,
    ) -> Result<DerivedKeys, KeyholdError> {
        let password = Zeroizing::new(password.expose_secret().as_bytes().to_vec());
        let config = self.shared.kdf.clone();
        tokio::task::spawn_blocking(move || {
            keyhold_crypto::derive_keys(&password, &salt, &config)
        })
        .await
        .map_err(|e| KeyholdError::Internal(format!("key derivation task failed: {e}")))?
    }

    async fn install(
        &self,
        generation: u64,
        snapshot: LoginSnapshot,
        data_key: DataKey,
    ) -> Result<(), KeyholdError> {
        let LoginSnapshot {
            access_token,
            user_id,
            email,
            salt,
            wrapped_data_key,
            vaults,
            items,
        } = snapshot;

        let mut inner = self.shared.inner.lock().await;
        if inner.generation != generation {
            info!(%email, "login superseded, discarding result");
            return Err(KeyholdError::NotAuthenticatedOrLocked);
        }

        let shell = SessionShell {
            user_id,
            email: email.clone(),
            vaults,
            salt,
            wrapped_data_key,
        };
        let token = Arc::new(access_token);
        let data_key = Arc::new(data_key);
        let count = items.len();

        // Storage is written before any in-memory state changes. A failure
        // leaves no session at all rather than a half-installed one.
        let keep_key = inner.keeps_volatile_key();
        if let Err(err) = self
            .store_login(&shell, &token, &data_key, items, keep_key)
            .await
        {
            warn!(%email, error = %err, "failed to store login, discarding session");
            if let Err(purge) = self.reset(&mut inner).await {
                warn!(error = %purge, "failed to purge session after storage error");
            }
            let update = inner.update();
            drop(inner);
            self.shared.broadcaster.publish(update);
            return Err(err);
        }

        inner.serial += 1;
        inner.shell = Some(shell);
        inner.token = Some(token);
        inner.data_key = Some(data_key);
        inner.last_activity = Instant::now();
        let update = inner.update();
        drop(inner);

        self.shared.broadcaster.publish(update);
        self.arm_idle();
        info!(%email, items = count, "logged in");
        Ok(())
    }

    /// Replace everything stored locally with a fresh login.
    async fn store_login(
        &self,
        shell: &SessionShell,
        token: &SecretString,
        data_key: &DataKey,
        items: Vec<EncryptedItem>,
        keep_key: bool,
    ) -> Result<(), KeyholdError> {
        self.shared.cache.clear().await;
        self.shared.durable.clear().await?;
        self.shared
            .durable
            .save_session(&persisted(shell, token))
            .await?;
        self.shared.cache.reconcile_from_remote(items).await?;
        if keep_key {
            self.shared.volatile.store_key(&data_key.export()).await
        } else {
            self.shared.volatile.clear().await
        }
    }

    async fn roll_back(&self, generation: u64) {
        let mut inner = self.shared.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        if let Err(err) = self.reset(&mut inner).await {
            warn!(error = %err, "failed to purge session during rollback");
        }
        let update = inner.update();
        drop(inner);
        self.shared.broadcaster.publish(update);
    }

    /// Back to `NoSession`, purging memory and every local store.
    async fn reset(&self, inner: &mut Inner) -> Result<(), KeyholdError> {
        inner.serial += 1;
        inner.shell = None;
        inner.token = None;
        inner.data_key = None;
        self.shared.timer.cancel();
        self.shared.cache.clear().await;

        let durable = self.shared.durable.clear().await;
        let volatile = self.shared.volatile.clear().await;
        durable.and(volatile)
    }

    async fn persist_session(&self, inner: &Inner) -> Result<(), KeyholdError> {
        if let (Some(shell), Some(token)) = (&inner.shell, &inner.token) {
            self.shared
                .durable
                .save_session(&persisted(shell, token))
                .await?;
        }
        Ok(())
    }

    async fn refresh_vaults(&self, auth: &Authorized) -> Result<(), KeyholdError> {
        let vaults = self.shared.remote.list_vaults(&auth.token).await?;
        let mut inner = self.shared.inner.lock().await;
        if inner.serial != auth.serial {
            return Err(KeyholdError::NotAuthenticatedOrLocked);
        }
        if let Some(shell) = inner.shell.as_mut() {
            shell.vaults = vaults;
        }
        self.persist_session(&inner).await?;
        let update = inner.update();
        drop(inner);

        self.shared.broadcaster.publish(update);
        Ok(())
    }

    async fn reconcile(&self, auth: &Authorized) -> Result<usize, KeyholdError> {
        let remote_set = self.shared.remote.fetch_items(&auth.token).await?;
        let count = remote_set.len();

        let inner = self.shared.inner.lock().await;
        if inner.serial != auth.serial {
            return Err(KeyholdError::NotAuthenticatedOrLocked);
        }
        self.shared.cache.reconcile_from_remote(remote_set).await?;
        drop(inner);

        debug!(count, "items synced");
        Ok(count)
    }

    fn arm_idle(&self) {
        let target: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared.timer.rearm(idle::run(target));
    }
}

fn persisted(shell: &SessionShell, token: &SecretString) -> PersistedSession {
    PersistedSession {
        shell: shell.clone(),
        access_token: SecretString::from(token.expose_secret().to_string()),
    }
}
