//! In-memory [`CacheStore`] used by the test suites.
//! Expiry is checked against the injected clock on every access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CacheStore;
use crate::clock::Clock;
use crate::store::StoreError;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Unavailable(format!("invalid ttl: {e}")))?;
        let mut entries = self.lock()?;

        if entries.get(key).is_some_and(|entry| entry.expires_at > now) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_entries_vanish_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = InMemoryCacheStore::new(clock.clone());

        assert!(store.put_if_absent("k", "v", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_key_can_be_rewritten() {
        let clock = Arc::new(ManualClock::new());
        let store = InMemoryCacheStore::new(clock.clone());

        assert!(store.put_if_absent("k", "old", Duration::from_secs(10)).await.unwrap());
        assert!(!store.put_if_absent("k", "new", Duration::from_secs(10)).await.unwrap());

        clock.advance(chrono::Duration::seconds(11));
        assert!(store.put_if_absent("k", "new", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }
}
