//! Per-key request coalescing within one process.
//!
//! Callers that miss the cache for the same fingerprint take turns: the first
//! one computes and stores the result, the rest wait and then find it in the
//! cache. Slots are held weakly so the registry only contains keys with a
//! holder or waiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct SingleFlight {
    slots: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

/// Held while computing the result for one key. Dropping it lets the next
/// waiter proceed.
pub struct FlightGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let slot = self.slot(key);
        FlightGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of keys with a live holder or waiter.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.strong_count() > 0).count()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = slots.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        slots.retain(|_, slot| slot.strong_count() > 0);
        let slot = Arc::new(AsyncMutex::new(()));
        slots.insert(key.to_string(), Arc::downgrade(&slot));
        slot
    }
}
