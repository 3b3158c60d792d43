// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential handoff between the untrusted page context and the session.
//!
//! A typed login is sealed under the data key on submit, parked in the
//! page's transient store across the navigation, and consumed exactly once
//! on the next page load. Plaintext never reaches the transient store.
//!
//! ```text
//! Idle -> CandidateDetected -> Encrypted&Stored -> Consumed
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use keyhold_config::model::HandoffConfig;
use keyhold_core::types::LoginRecord;
use keyhold_core::{Item, KeyholdError, PendingHandoff, Record, TransientStore};

use crate::domain::normalize_domain;
use crate::machine::SessionMachine;

/// A login the detector saw being submitted.
pub struct Candidate {
    pub username: String,
    pub password: SecretString,
    pub url: String,
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("url", &self.url)
            .finish()
    }
}

/// Sealed form of a candidate. Short keys keep the blob small.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct HandoffPayload {
    u: String,
    p: String,
    l: String,
}

/// Why a pending handoff produced no prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DiscardReason {
    Locked,
    Expired,
    Undecryptable,
    InvalidUrl,
    SiteDisabled,
    AlreadySaved,
    AlreadyOffered,
}

/// An offer to save a newly seen login.
pub struct SavePrompt {
    pub domain: String,
    pub username: String,
    pub password: SecretString,
    pub url: String,
}

impl fmt::Debug for SavePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavePrompt")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug)]
pub enum HandoffOutcome {
    Discarded(DiscardReason),
    Prompt(SavePrompt),
}

/// Most (domain, username) pairs remembered per session.
const MAX_OFFERED: usize = 256;

/// (domain, username) pairs already offered, scoped to one login session.
/// Oldest entries are forgotten past [`MAX_OFFERED`].
#[derive(Default)]
struct Offered {
    serial: u64,
    seen: HashSet<(String, String)>,
    order: VecDeque<(String, String)>,
}

impl Offered {
    /// Returns `false` if the pair was already offered in session `serial`.
    fn insert(&mut self, serial: u64, key: (String, String)) -> bool {
        if self.serial != serial {
            self.serial = serial;
            self.seen.clear();
            self.order.clear();
        }
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > MAX_OFFERED {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }
}

/// Privileged side of the handoff.
pub struct HandoffProtocol {
    session: SessionMachine,
    ttl_ms: i64,
    disabled_sites: Mutex<HashSet<String>>,
    offered: Mutex<Offered>,
}

impl HandoffProtocol {
    pub fn new(session: SessionMachine, config: &HandoffConfig) -> Self {
        let disabled_sites = config
            .disabled_sites
            .iter()
            .filter_map(|site| normalize_domain(site))
            .collect();
        Self {
            session,
            ttl_ms: i64::try_from(config.ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX),
            disabled_sites: Mutex::new(disabled_sites),
            offered: Mutex::new(Offered::default()),
        }
    }

    /// Seal a candidate under the data key. Requires an unlocked session.
    pub async fn capture(&self, candidate: &Candidate) -> Result<PendingHandoff, KeyholdError> {
        let (data_key, _) = self
            .session
            .unlocked_key()
            .await
            .ok_or(KeyholdError::NotAuthenticatedOrLocked)?;

        let payload = HandoffPayload {
            u: candidate.username.clone(),
            p: candidate.password.expose_secret().to_string(),
            l: candidate.url.clone(),
        };
        let blob = keyhold_crypto::seal_json(&data_key, &payload)?;
        debug!("candidate sealed for handoff");

        Ok(PendingHandoff {
            blob,
            timestamp_ms: Utc::now().timestamp_millis(),
        })
    }

    /// Decide whether a pending handoff becomes a save prompt.
    pub async fn consume(&self, pending: PendingHandoff) -> HandoffOutcome {
        self.consume_at(pending, Utc::now().timestamp_millis()).await
    }

    async fn consume_at(&self, pending: PendingHandoff, now_ms: i64) -> HandoffOutcome {
        let outcome = self.evaluate(pending, now_ms).await;
        match &outcome {
            HandoffOutcome::Discarded(reason) => debug!(%reason, "handoff discarded"),
            HandoffOutcome::Prompt(prompt) => {
                info!(domain = %prompt.domain, "offering to save login");
            }
        }
        outcome
    }

    async fn evaluate(&self, pending: PendingHandoff, now_ms: i64) -> HandoffOutcome {
        use HandoffOutcome::Discarded;

        let Some((data_key, serial)) = self.session.unlocked_key().await else {
            return Discarded(DiscardReason::Locked);
        };

        // The timestamp comes back from the page and may be anything.
        match now_ms.checked_sub(pending.timestamp_ms) {
            Some(age_ms) if (0..=self.ttl_ms).contains(&age_ms) => {}
            _ => return Discarded(DiscardReason::Expired),
        }

        let Ok(payload) = keyhold_crypto::open_json::<HandoffPayload>(&data_key, &pending.blob)
        else {
            return Discarded(DiscardReason::Undecryptable);
        };

        let Some(domain) = normalize_domain(&payload.l) else {
            return Discarded(DiscardReason::InvalidUrl);
        };

        if self.disabled().contains(&domain) {
            return Discarded(DiscardReason::SiteDisabled);
        }

        if self.already_saved(&data_key, &domain, &payload.u).await {
            return Discarded(DiscardReason::AlreadySaved);
        }

        if !lock(&self.offered).insert(serial, (domain.clone(), payload.u.clone())) {
            return Discarded(DiscardReason::AlreadyOffered);
        }

        HandoffOutcome::Prompt(SavePrompt {
            domain,
            username: payload.u.clone(),
            password: SecretString::from(payload.p.clone()),
            url: payload.l.clone(),
        })
    }

    async fn already_saved(
        &self,
        data_key: &keyhold_crypto::DataKey,
        domain: &str,
        username: &str,
    ) -> bool {
        self.session
            .cache()
            .get_all()
            .await
            .iter()
            .filter_map(|item| keyhold_crypto::decrypt_item(data_key, item).ok())
            .any(|item| match &item.record {
                Record::Login(login) => {
                    login.username == username
                        && login
                            .url
                            .as_deref()
                            .and_then(normalize_domain)
                            .is_some_and(|saved| saved == domain)
                }
                Record::Note(_) => false,
            })
    }

    /// Save the prompted login into `vault_id`.
    pub async fn accept(&self, prompt: SavePrompt, vault_id: i64) -> Result<Item, KeyholdError> {
        let record = Record::Login(LoginRecord {
            name: prompt.domain.clone(),
            username: prompt.username.clone(),
            password: prompt.password.expose_secret().to_string(),
            url: Some(prompt.url.clone()),
            notes: None,
        });
        self.session.save_item(Item::new(vault_id, record)).await
    }

    /// Never offer prompts for `site` again. Returns `false` if the input
    /// has no usable domain.
    pub fn disable_site(&self, site: &str) -> bool {
        match normalize_domain(site) {
            Some(domain) => {
                info!(%domain, "save prompts disabled for site");
                lock(&self.disabled_sites).insert(domain);
                true
            }
            None => false,
        }
    }

    pub fn disabled_sites(&self) -> Vec<String> {
        let mut sites: Vec<String> = self.disabled().iter().cloned().collect();
        sites.sort();
        sites
    }

    fn disabled(&self) -> MutexGuard<'_, HashSet<String>> {
        lock(&self.disabled_sites)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Page side of the handoff, bound to one page's transient store.
pub struct PageContext<T: TransientStore> {
    store: T,
    protocol: Arc<HandoffProtocol>,
}

impl<T: TransientStore> PageContext<T> {
    pub fn new(store: T, protocol: Arc<HandoffProtocol>) -> Self {
        Self { store, protocol }
    }

    /// Capture a submitted login and park it for the next page load.
    pub async fn on_submit(&self, candidate: &Candidate) -> Result<(), KeyholdError> {
        let pending = self.protocol.capture(candidate).await?;
        self.store.put(pending).await
    }

    /// Take (and delete) the parked handoff, if any, and consume it.
    pub async fn on_page_load(&self) -> Result<Option<HandoffOutcome>, KeyholdError> {
        let Some(pending) = self.store.take().await? else {
            return Ok(None);
        };
        Ok(Some(self.protocol.consume(pending).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyhold_config::KeyholdConfig;
    use keyhold_storage::MemoryVolatileStore;
    use keyhold_test_utils::{test_kdf_config, MemoryDurableStore, MockRemoteStore};

    use crate::transient::MemoryTransientStore;

    async fn unlocked_session(disabled_sites: &[&str]) -> (SessionMachine, HandoffProtocol) {
        let mut config = KeyholdConfig::default();
        config.kdf = test_kdf_config();
        config.handoff.disabled_sites = disabled_sites.iter().map(|s| s.to_string()).collect();

        let session = SessionMachine::new(
            &config,
            Arc::new(MockRemoteStore::new()),
            Arc::new(MemoryDurableStore::new()),
            Arc::new(MemoryVolatileStore::new()),
        );
        session
            .register("ada@example.com", &SecretString::from("Tr0ub4dor&3"))
            .await
            .unwrap();
        let protocol = HandoffProtocol::new(session.clone(), &config.handoff);
        (session, protocol)
    }

    fn candidate(username: &str, url: &str) -> Candidate {
        Candidate {
            username: username.to_string(),
            password: SecretString::from("s3cret!"),
            url: url.to_string(),
        }
    }

    fn reason(outcome: HandoffOutcome) -> Option<DiscardReason> {
        match outcome {
            HandoffOutcome::Discarded(reason) => Some(reason),
            HandoffOutcome::Prompt(_) => None,
        }
    }

    #[tokio::test]
    async fn fresh_candidate_becomes_prompt() {
        let (_session, protocol) = unlocked_session(&[]).await;
        let pending = protocol
            .capture(&candidate("ada", "https://www.Example.com/login"))
            .await
            .unwrap();

        match protocol.consume(pending).await {
            HandoffOutcome::Prompt(prompt) => {
                assert_eq!(prompt.domain, "example.com");
                assert_eq!(prompt.username, "ada");
                assert_eq!(prompt.password.expose_secret(), "s3cret!");
            }
            other => panic!("expected prompt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blob_never_contains_plaintext() {
        let (_session, protocol) = unlocked_session(&[]).await;
        let pending = protocol
            .capture(&candidate("ada", "https://example.com"))
            .await
            .unwrap();
        let json = serde_json::to_string(&pending).unwrap();
        assert!(!json.contains("s3cret!"));
        assert!(!json.contains("example.com"));
    }

    #[tokio::test]
    async fn expired_blob_is_discarded() {
        let (_session, protocol) = unlocked_session(&[]).await;
        let pending = protocol
            .capture(&candidate("ada", "https://example.com"))
            .await
            .unwrap();
        let late = pending.timestamp_ms + protocol.ttl_ms + 1;

        assert_eq!(
            reason(protocol.consume_at(pending, late).await),
            Some(DiscardReason::Expired)
        );
    }

    #[tokio::test]
    async fn future_timestamp_is_discarded() {
        let (_session, protocol) = unlocked_session(&[]).await;
        let pending = protocol
            .capture(&candidate("ada", "https://example.com"))
            .await
            .unwrap();
        let before = pending.timestamp_ms - 1;

        assert_eq!(
            reason(protocol.consume_at(pending, before).await),
            Some(DiscardReason::Expired)
        );
    }

    #[tokio::test]
    async fn extreme_timestamps_are_expired() {
        let (_session, protocol) = unlocked_session(&[]).await;
        for timestamp_ms in [i64::MIN, i64::MAX] {
            let mut pending = protocol
                .capture(&candidate("ada", "https://example.com"))
                .await
                .unwrap();
            pending.timestamp_ms = timestamp_ms;
            assert_eq!(
                reason(protocol.consume(pending).await),
                Some(DiscardReason::Expired)
            );
        }
    }

    #[test]
    fn offered_set_is_bounded() {
        let mut offered = Offered::default();
        for n in 0..MAX_OFFERED + 10 {
            assert!(offered.insert(1, (format!("site{n}.example"), "ada".to_string())));
        }
        assert_eq!(offered.len(), MAX_OFFERED);
        // The oldest pairs were forgotten, the newest are still remembered.
        assert!(offered.insert(1, ("site0.example".to_string(), "ada".to_string())));
        let newest = format!("site{}.example", MAX_OFFERED + 9);
        assert!(!offered.insert(1, (newest, "ada".to_string())));
    }

    #[test]
    fn offered_set_resets_on_new_session() {
        let mut offered = Offered::default();
        let key = ("example.com".to_string(), "ada".to_string());
        assert!(offered.insert(1, key.clone()));
        assert!(!offered.insert(1, key.clone()));
        assert!(offered.insert(2, key));
        assert_eq!(offered.len(), 1);
    }

    #[tokio::test]
    async fn same_login_is_offered_once() {
        let (_session, protocol) = unlocked_session(&[]).await;
        let first = protocol
            .capture(&candidate("ada", "https://example.com/a"))
            .await
            .unwrap();
        let second = protocol
            .capture(&candidate("ada", "https://www.example.com/b"))
            .await
            .unwrap();

        assert!(matches!(
            protocol.consume(first).await,
            HandoffOutcome::Prompt(_)
        ));
        assert_eq!(
            reason(protocol.consume(second).await),
            Some(DiscardReason::AlreadyOffered)
        );
    }

    #[tokio::test]
    async fn saved_login_is_not_offered() {
        let (session, protocol) = unlocked_session(&[]).await;
        let vault_id = session.shell().await.unwrap().vaults[0].id;

        let pending = protocol
            .capture(&candidate("ada", "https://example.com"))
            .await
            .unwrap();
        let HandoffOutcome::Prompt(prompt) = protocol.consume(pending).await else {
            panic!("expected prompt");
        };
        protocol.accept(prompt, vault_id).await.unwrap();

        // A fresh protocol has no memory of the offer; the cache still dedups.
        let config = HandoffConfig::default();
        let fresh = HandoffProtocol::new(session.clone(), &config);
        let pending = fresh
            .capture(&candidate("ada", "https://example.com/other"))
            .await
            .unwrap();
        assert_eq!(
            reason(fresh.consume(pending).await),
            Some(DiscardReason::AlreadySaved)
        );
    }

    #[tokio::test]
    async fn disabled_site_is_skipped() {
        let (_session, protocol) = unlocked_session(&["bank.example"]).await;
        let pending = protocol
            .capture(&candidate("ada", "https://www.bank.example/login"))
            .await
            .unwrap();
        assert_eq!(
            reason(protocol.consume(pending).await),
            Some(DiscardReason::SiteDisabled)
        );

        assert!(protocol.disable_site("shop.example"));
        assert!(!protocol.disable_site(""));
        assert_eq!(
            protocol.disabled_sites(),
            vec!["bank.example".to_string(), "shop.example".to_string()]
        );
    }

    #[tokio::test]
    async fn locked_session_neither_captures_nor_consumes() {
        let (session, protocol) = unlocked_session(&[]).await;
        let pending = protocol
            .capture(&candidate("ada", "https://example.com"))
            .await
            .unwrap();

        session.lock().await.unwrap();
        assert!(matches!(
            protocol.capture(&candidate("ada", "https://example.com")).await,
            Err(KeyholdError::NotAuthenticatedOrLocked)
        ));
        assert_eq!(
            reason(protocol.consume(pending).await),
            Some(DiscardReason::Locked)
        );
    }

    #[tokio::test]
    async fn tampered_blob_is_undecryptable() {
        let (_session, protocol) = unlocked_session(&[]).await;
        let mut pending = protocol
            .capture(&candidate("ada", "https://example.com"))
            .await
            .unwrap();
        pending.blob.ciphertext[0] ^= 0xff;

        assert_eq!(
            reason(protocol.consume(pending).await),
            Some(DiscardReason::Undecryptable)
        );
    }

    #[tokio::test]
    async fn page_context_consumes_once() {
        let (_session, protocol) = unlocked_session(&[]).await;
        let page = PageContext::new(MemoryTransientStore::new(), Arc::new(protocol));

        page.on_submit(&candidate("ada", "https://example.com"))
            .await
            .unwrap();
        assert!(matches!(
            page.on_page_load().await.unwrap(),
            Some(HandoffOutcome::Prompt(_))
        ));
        assert!(page.on_page_load().await.unwrap().is_none());
    }
}
