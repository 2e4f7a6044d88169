//! In-memory cache of the provider's signing keys

use std::{sync::Arc, time::Duration};

use bon::bon;
use rocket::tokio::sync::{Mutex, RwLock};

use crate::{
    clock::{Clock, SystemClock},
    keys::{KeySet, SigningKey, fetcher::KeySetFetcher},
};

/// Minimum time between two refreshes that weren't caused by an empty cache
pub const DEFAULT_MIN_INVALIDATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Maximum age of a fetched key set before it's considered stale
pub const DEFAULT_MAX_KEY_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// A successfully fetched key set. Replaced wholesale, never mutated.
#[derive(Debug)]
struct CacheEntry {
    keys: KeySet,
    /// Monotonic time of the fetch
    fetched_at: Duration,
}

impl CacheEntry {
    fn is_stale(&self, now: Duration, max_age: Duration) -> bool {
        now.saturating_sub(self.fetched_at) >= max_age
    }

    fn lookup(&self, key_id: &str) -> Option<SigningKey> {
        self.keys.get(key_id).cloned()
    }
}

/// Rate limit on refreshes that callers can trigger by presenting an unknown key id
#[derive(Debug)]
struct InvalidationGate {
    last_invalidation_at: Option<Duration>,
    min_interval: Duration,
}

impl InvalidationGate {
    /// Record an invalidation at monotonic time `now` if the interval has elapsed
    /// since the last one
    fn try_invalidate(&mut self, now: Duration) -> bool {
        let permitted = self
            .last_invalidation_at
            .is_none_or(|last| now.saturating_sub(last) >= self.min_interval);
        if permitted {
            self.last_invalidation_at = Some(now);
        }
        permitted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    Empty,
    Stale,
    UnknownKey,
}

/**
Cache of the provider's signing keys, refreshed through a [KeySetFetcher].

Known key ids are served from memory. An unknown key id, or a key set older than
`max_age`, triggers a refresh, but at most once per `min_invalidation_interval`
so that forged tokens with random key ids can't force a fetch on every request.
An empty cache always fetches.

Refreshes are serialized: while one is in flight, other callers needing a refresh
wait for it and then use its result.

# Example
```
use std::time::Duration;
use moneykit_webhook::keys::{cache::KeySetCache, fetcher::HttpKeySetFetcher};

let cache = KeySetCache::builder()
    .fetcher(HttpKeySetFetcher::builder().build().unwrap())
    .min_invalidation_interval(Duration::from_secs(60))
    .build();
```
*/
pub struct KeySetCache<F> {
    fetcher: F,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    entry: RwLock<Option<Arc<CacheEntry>>>,
    gate: Mutex<InvalidationGate>,
}

#[bon]
impl<F> KeySetCache<F>
where
    F: KeySetFetcher,
{
    #[builder]
    pub fn new(
        /// Where the keys come from
        fetcher: F,
        /// Time source for refresh bookkeeping (default: system clock)
        #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)]
        clock: Arc<dyn Clock>,
        /// Minimum time between refreshes caused by an unknown key id or a stale
        /// key set (default: 5 minutes)
        #[builder(default = DEFAULT_MIN_INVALIDATION_INTERVAL)]
        min_invalidation_interval: Duration,
        /// How long a fetched key set is trusted before refreshing (default: 12 hours)
        #[builder(default = DEFAULT_MAX_KEY_AGE)]
        max_age: Duration,
    ) -> Self {
        Self {
            fetcher,
            clock,
            max_age,
            entry: RwLock::new(None),
            gate: Mutex::new(InvalidationGate {
                last_invalidation_at: None,
                min_interval: min_invalidation_interval,
            }),
        }
    }

    /// The clock used by this cache
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Find the signing key with the given id, refreshing the key set if needed
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn resolve_key(&self, key_id: &str) -> Option<SigningKey> {
        let observed = self.entry.read().await.clone();
        if let Some(entry) = &observed {
            if !entry.is_stale(self.clock.monotonic_now(), self.max_age) {
                if let Some(key) = entry.lookup(key_id) {
                    tracing::trace!("key found in cache");
                    return Some(key);
                }
            }
        }

        self.refresh_and_resolve(key_id, observed).await
    }

    /// Populate the cache ahead of the first webhook. Failures are logged and
    /// left for the first [resolve_key](Self::resolve_key) to retry.
    pub async fn warm(&self) {
        let _gate = self.gate.lock().await;
        if self.entry.read().await.is_some() {
            return;
        }
        match self.fetcher.fetch().await {
            Ok(keys) => {
                tracing::info!(keys = keys.len(), "key set cached");
                self.replace(keys).await;
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "failed to fetch key set at startup, will retry on first webhook"
                )
            }
        }
    }

    async fn refresh_and_resolve(
        &self,
        key_id: &str,
        observed: Option<Arc<CacheEntry>>,
    ) -> Option<SigningKey> {
        let mut gate = self.gate.lock().await;

        let current = self.entry.read().await.clone();
        let replaced_while_waiting = match (&observed, &current) {
            (Some(before), Some(now)) => !Arc::ptr_eq(before, now),
            (None, None) => false,
            _ => true,
        };
        if replaced_while_waiting {
            tracing::debug!("key set was refreshed by a concurrent request");
            return current.and_then(|entry| entry.lookup(key_id));
        }

        let now = self.clock.monotonic_now();
        let trigger = match &current {
            None => RefreshTrigger::Empty,
            Some(entry) if entry.is_stale(now, self.max_age) => RefreshTrigger::Stale,
            Some(_) => RefreshTrigger::UnknownKey,
        };

        if trigger != RefreshTrigger::Empty && !gate.try_invalidate(now) {
            tracing::debug!(?trigger, "key set refresh denied, refreshed too recently");
            return current.and_then(|entry| entry.lookup(key_id));
        }

        tracing::info!(?trigger, "refreshing key set");
        match self.fetcher.fetch().await {
            Ok(keys) => {
                let entry = self.replace(keys).await;
                entry.lookup(key_id)
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    ?trigger,
                    "key set refresh failed, keeping previous keys"
                );
                current.and_then(|entry| entry.lookup(key_id))
            }
        }
    }

    async fn replace(&self, keys: KeySet) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            keys,
            fetched_at: self.clock.monotonic_now(),
        });
        *self.entry.write().await = Some(Arc::clone(&entry));
        entry
    }
}
