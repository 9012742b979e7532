//! Result cache keyed by analysis fingerprint.
//!
//! [`CacheStore`] is the byte-level backend (Redis in production). It owns
//! expiry: entries are written with a TTL and disappear on their own.
//! [`ResultCache`] layers typed payloads, namespacing and the
//! `expires_at` check on top, so an entry the store has not purged yet still
//! reads as a miss once its lifetime has passed.

#[cfg(test)]
pub mod memory;
pub mod redis_store;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::fingerprint::Fingerprint;
use crate::clock::Clock;
use crate::store::StoreError;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` only if `key` is absent (or expired).
    /// Returns `false` when another writer got there first.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// A persisted analysis result. Read-only once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResult<T> {
    pub fingerprint: String,
    pub requester_id: String,
    pub payload: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum PutOutcome<T> {
    Stored(CachedResult<T>),
    /// An entry for this fingerprint already exists; nothing was written.
    AlreadyExists,
}

pub struct ResultCache<T> {
    namespace: &'static str,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T> ResultCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(
        namespace: &'static str,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            namespace,
            store,
            clock,
            ttl,
            _payload: PhantomData,
        }
    }

    pub fn key(&self, fingerprint: &Fingerprint) -> String {
        format!("analysis:{}:{}", self.namespace, fingerprint.to_hex())
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CachedResult<T>>, StoreError> {
        let key = self.key(fingerprint);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let entry: CachedResult<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Discarding undecodable cache entry {key}: {e}");
                return Ok(None);
            }
        };

        if entry.expires_at <= self.clock.now() {
            debug!("Cache entry {key} is past its lifetime, treating as miss");
            return Ok(None);
        }

        Ok(Some(entry))
    }

    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        requester_id: &str,
        payload: T,
    ) -> Result<PutOutcome<T>, StoreError> {
        let created_at = self.clock.now();
        let lifetime =
            chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let entry = CachedResult {
            fingerprint: fingerprint.to_hex(),
            requester_id: requester_id.to_string(),
            payload,
            created_at,
            expires_at: created_at + lifetime,
        };

        let value = serde_json::to_string(&entry)
            .map_err(|e| StoreError::Unavailable(format!("cannot encode cache entry: {e}")))?;

        let stored = self
            .store
            .put_if_absent(&self.key(fingerprint), &value, self.ttl)
            .await?;

        Ok(if stored {
            PutOutcome::Stored(entry)
        } else {
            PutOutcome::AlreadyExists
        })
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use crate::clock::ManualClock;

    /// Store that never expires anything, standing in for a TTL index
    /// whose background purge has not run yet.
    #[derive(Default)]
    struct LazyPurgeStore {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl CacheStore for LazyPurgeStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn put_if_absent(
            &self,
            key: &str,
            value: &str,
            _ttl: Duration,
        ) -> Result<bool, StoreError> {
            let mut entries = self.entries.lock().unwrap();
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(key.to_string(), value.to_string());
            Ok(true)
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn fp() -> Fingerprint {
        Fingerprint::of("resume", "jd", "u1")
    }

    #[tokio::test]
    async fn test_put_then_get_returns_entry() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(InMemoryCacheStore::new(clock.clone()));
        let cache: ResultCache<Vec<String>> =
            ResultCache::new("fit_analysis", store, clock.clone(), Duration::from_secs(3600));

        let outcome = cache.put(&fp(), "u1", vec!["Go".to_string()]).await.unwrap();
        let stored = match outcome {
            PutOutcome::Stored(entry) => entry,
            PutOutcome::AlreadyExists => panic!("first put must store"),
        };
        assert_eq!(stored.expires_at - stored.created_at, chrono::Duration::hours(1));

        let hit = cache.get(&fp()).await.unwrap().expect("entry should be cached");
        assert_eq!(hit, stored);
        assert_eq!(hit.fingerprint, fp().to_hex());
    }

    #[tokio::test]
    async fn test_second_put_reports_already_exists() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(InMemoryCacheStore::new(clock.clone()));
        let cache: ResultCache<u32> =
            ResultCache::new("ats_score", store, clock, Duration::from_secs(3600));

        assert!(matches!(cache.put(&fp(), "u1", 1).await.unwrap(), PutOutcome::Stored(_)));
        assert!(matches!(cache.put(&fp(), "u1", 2).await.unwrap(), PutOutcome::AlreadyExists));
        assert_eq!(cache.get(&fp()).await.unwrap().unwrap().payload, 1);
    }

    #[tokio::test]
    async fn test_expired_but_unpurged_entry_is_a_miss() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(LazyPurgeStore::default());
        let cache: ResultCache<u32> =
            ResultCache::new("ats_score", store, clock.clone(), Duration::from_secs(3600));

        cache.put(&fp(), "u1", 7).await.unwrap();
        clock.advance(chrono::Duration::minutes(59));
        assert!(cache.get(&fp()).await.unwrap().is_some());

        clock.advance(chrono::Duration::minutes(1));
        assert!(cache.get(&fp()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let clock = Arc::new(ManualClock::new());
        let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new(clock.clone()));
        let fit: ResultCache<u32> =
            ResultCache::new("fit_analysis", store.clone(), clock.clone(), Duration::from_secs(60));
        let ats: ResultCache<u32> =
            ResultCache::new("ats_score", store, clock, Duration::from_secs(60));

        fit.put(&fp(), "u1", 1).await.unwrap();
        assert!(ats.get(&fp()).await.unwrap().is_none());
        assert_ne!(fit.key(&fp()), ats.key(&fp()));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(LazyPurgeStore::default());
        let cache: ResultCache<u32> =
            ResultCache::new("ats_score", store.clone(), clock, Duration::from_secs(60));

        store
            .entries
            .lock()
            .unwrap()
            .insert(cache.key(&fp()), "not json".to_string());
        assert!(cache.get(&fp()).await.unwrap().is_none());
    }
}
