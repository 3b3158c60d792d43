// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local cache of encrypted items.
//!
//! Writes go remote first, then to the durable store, then to memory. A
//! remote failure leaves both local copies untouched. The cache never sees
//! plaintext.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::debug;

use keyhold_core::{DurableStore, EncryptedItem, ItemIdentifier, KeyholdError, RemoteStore};

struct CacheState {
    items: Vec<EncryptedItem>,
    /// Bumped by [`ItemCache::clear`]. A write that started under an older
    /// epoch is not committed.
    epoch: u64,
}

/// Exclusive owner of the encrypted item collection.
pub struct ItemCache {
    remote: Arc<dyn RemoteStore>,
    durable: Arc<dyn DurableStore>,
    state: Mutex<CacheState>,
}

impl ItemCache {
    pub fn new(remote: Arc<dyn RemoteStore>, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            remote,
            durable,
            state: Mutex::new(CacheState {
                items: Vec::new(),
                epoch: 0,
            }),
        }
    }

    pub async fn get_all(&self) -> Vec<EncryptedItem> {
        self.state.lock().await.items.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: &ItemIdentifier) -> Option<EncryptedItem> {
        self.state
            .lock()
            .await
            .items
            .iter()
            .find(|item| &item.uuid == id)
            .cloned()
    }

    /// Create (no remote id yet) or update an item.
    ///
    /// Updating an item with a provisional identifier assigns it a stable one;
    /// the upgrade only sticks when the remote accepts the update.
    pub async fn upsert(
        &self,
        token: &SecretString,
        item: EncryptedItem,
    ) -> Result<EncryptedItem, KeyholdError> {
        let epoch = self.state.lock().await.epoch;
        let previous_id = item.uuid.clone();

        let stored = match item.id {
            None => self.remote.create_item(token, &item).await?,
            Some(_) => {
                let mut outgoing = item;
                outgoing.uuid = outgoing.uuid.upgraded();
                let sent = outgoing.uuid.clone();
                let mut stored = self.remote.update_item(token, &outgoing).await?;
                // Servers that predate UUIDs echo none back; keep ours.
                if stored.uuid.is_provisional() {
                    stored.uuid = sent;
                }
                stored
            }
        };

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return Err(KeyholdError::NotAuthenticatedOrLocked);
        }

        let mut next = state.items.clone();
        match next.iter().position(|existing| {
            existing.uuid == previous_id || (existing.id.is_some() && existing.id == stored.id)
        }) {
            Some(index) => next[index] = stored.clone(),
            None => next.push(stored.clone()),
        }
        self.durable.save_items(&next).await?;
        state.items = next;

        if previous_id != stored.uuid {
            debug!(from = %previous_id, to = %stored.uuid, "item identifier upgraded");
        }
        debug!(item = %stored.uuid, "item saved");
        Ok(stored)
    }

    /// Delete an item. Returns `false` if it is not in the cache.
    pub async fn remove(
        &self,
        token: &SecretString,
        id: &ItemIdentifier,
    ) -> Result<bool, KeyholdError> {
        let (epoch, remote_id) = {
            let state = self.state.lock().await;
            match state.items.iter().find(|item| &item.uuid == id) {
                Some(item) => (state.epoch, item.id),
                None => return Ok(false),
            }
        };

        if let Some(remote_id) = remote_id {
            self.remote.delete_item(token, remote_id).await?;
        }

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return Err(KeyholdError::NotAuthenticatedOrLocked);
        }
        let next: Vec<EncryptedItem> = state
            .items
            .iter()
            .filter(|item| &item.uuid != id)
            .cloned()
            .collect();
        self.durable.save_items(&next).await?;
        state.items = next;

        debug!(item = %id, "item deleted");
        Ok(true)
    }

    /// Replace the whole local set with the remote one.
    pub async fn reconcile_from_remote(
        &self,
        remote_set: Vec<EncryptedItem>,
    ) -> Result<(), KeyholdError> {
        let mut state = self.state.lock().await;
        self.durable.save_items(&remote_set).await?;
        debug!(count = remote_set.len(), "cache reconciled from remote");
        state.items = remote_set;
        Ok(())
    }

    /// Load whatever the durable store holds into memory.
    pub async fn load_from_durable(&self) -> Result<usize, KeyholdError> {
        let items = self.durable.load_items().await?;
        let count = items.len();
        self.state.lock().await.items = items;
        Ok(count)
    }

    /// Drop the in-memory set and cancel the commit of in-flight writes.
    /// The durable copy is purged separately by the session.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.items.clear();
        state.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keyhold_test_utils::{MemoryDurableStore, MockRemoteStore};

    fn item(id: Option<i64>, uuid: ItemIdentifier) -> EncryptedItem {
        let now = Utc::now();
        EncryptedItem {
            id,
            uuid,
            vault_id: 1,
            ciphertext: vec![1, 2, 3],
            nonce: vec![0u8; 12],
            created_at: now,
            updated_at: now,
        }
    }

    fn token() -> SecretString {
        SecretString::from("tok")
    }

    #[tokio::test]
    async fn create_assigns_remote_id_and_persists() {
        let remote = Arc::new(MockRemoteStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let cache = ItemCache::new(remote, durable.clone());

        let stored = cache
            .upsert(&token(), item(None, ItemIdentifier::new_stable()))
            .await
            .unwrap();

        assert!(stored.id.is_some());
        assert_eq!(cache.get_all().await, vec![stored.clone()]);
        assert_eq!(durable.load_items().await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn remote_failure_leaves_local_copies_untouched() {
        let remote = Arc::new(MockRemoteStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let cache = ItemCache::new(remote.clone(), durable.clone());
        let existing = cache
            .upsert(&token(), item(None, ItemIdentifier::new_stable()))
            .await
            .unwrap();

        remote.set_offline(true);
        let mut changed = existing.clone();
        changed.ciphertext = vec![9, 9, 9];
        let err = cache.upsert(&token(), changed).await.unwrap_err();

        assert!(matches!(err, KeyholdError::Network { .. }));
        assert_eq!(cache.get_all().await, vec![existing.clone()]);
        assert_eq!(durable.load_items().await.unwrap(), vec![existing]);
    }

    #[tokio::test]
    async fn provisional_identifier_is_upgraded_on_update() {
        let remote = Arc::new(MockRemoteStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let cache = ItemCache::new(remote, durable);
        cache
            .reconcile_from_remote(vec![item(Some(5), ItemIdentifier::Provisional(5))])
            .await
            .unwrap();

        let mut legacy = cache.get(&ItemIdentifier::Provisional(5)).await.unwrap();
        legacy.ciphertext = vec![7];
        let stored = cache.upsert(&token(), legacy).await.unwrap();

        assert!(!stored.uuid.is_provisional());
        assert_eq!(stored.id, Some(5));
        let all = cache.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].uuid, stored.uuid);
    }

    #[tokio::test]
    async fn failed_update_keeps_provisional_identifier() {
        let remote = Arc::new(MockRemoteStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let cache = ItemCache::new(remote.clone(), durable);
        cache
            .reconcile_from_remote(vec![item(Some(5), ItemIdentifier::Provisional(5))])
            .await
            .unwrap();

        remote.set_offline(true);
        let legacy = cache.get(&ItemIdentifier::Provisional(5)).await.unwrap();
        assert!(cache.upsert(&token(), legacy).await.is_err());

        assert!(cache.get(&ItemIdentifier::Provisional(5)).await.is_some());
    }

    #[tokio::test]
    async fn reconcile_replaces_whole_set() {
        let remote = Arc::new(MockRemoteStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let cache = ItemCache::new(remote, durable.clone());
        cache
            .reconcile_from_remote(vec![
                item(Some(1), ItemIdentifier::new_stable()),
                item(Some(2), ItemIdentifier::new_stable()),
            ])
            .await
            .unwrap();

        let fresh = item(Some(3), ItemIdentifier::new_stable());
        cache.reconcile_from_remote(vec![fresh.clone()]).await.unwrap();

        assert_eq!(cache.get_all().await, vec![fresh.clone()]);
        assert_eq!(durable.load_items().await.unwrap(), vec![fresh]);
    }

    #[tokio::test]
    async fn remove_deletes_remote_then_local() {
        let remote = Arc::new(MockRemoteStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let cache = ItemCache::new(remote.clone(), durable.clone());
        let stored = cache
            .upsert(&token(), item(None, ItemIdentifier::new_stable()))
            .await
            .unwrap();

        assert!(cache.remove(&token(), &stored.uuid).await.unwrap());
        assert!(cache.is_empty().await);
        assert!(durable.load_items().await.unwrap().is_empty());
        assert_eq!(remote.deleted(), vec![stored.id.unwrap()]);

        assert!(!cache.remove(&token(), &stored.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn clear_discards_in_flight_commit() {
        let remote = Arc::new(MockRemoteStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let cache = Arc::new(ItemCache::new(remote.clone(), durable.clone()));

        remote.hold_next_call();
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .upsert(&token(), item(None, ItemIdentifier::new_stable()))
                    .await
            })
        };
        remote.wait_until_held().await;
        cache.clear().await;
        remote.release();

        let result = writer.await.unwrap();
        assert!(matches!(result, Err(KeyholdError::NotAuthenticatedOrLocked)));
        assert!(cache.is_empty().await);
        assert!(durable.load_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_from_durable_fills_memory() {
        let remote = Arc::new(MockRemoteStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        durable
            .save_items(&[item(Some(1), ItemIdentifier::new_stable())])
            .await
            .unwrap();

        let cache = ItemCache::new(remote, durable);
        assert_eq!(cache.load_from_durable().await.unwrap(), 1);
        assert_eq!(cache.len().await, 1);
    }
}
