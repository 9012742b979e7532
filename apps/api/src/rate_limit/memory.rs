//! In-memory [`RateLimitLog`] used by the test suites.
//!
//! Not shared across processes, so it only enforces the limit per instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{RateLimitLog, WindowDecision};
use crate::store::StoreError;

type LogKey = (String, String);

pub struct InMemoryRateLimitLog {
    records: Mutex<HashMap<LogKey, VecDeque<DateTime<Utc>>>>,
}

impl InMemoryRateLimitLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRateLimitLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitLog for InMemoryRateLimitLog {
    async fn record_if_below(
        &self,
        namespace: &str,
        requester: &str,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
        max_requests: u32,
    ) -> Result<WindowDecision, StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("rate-limit log lock poisoned".to_string()))?;
        let entries = records
            .entry((namespace.to_string(), requester.to_string()))
            .or_default();

        let in_window: Vec<DateTime<Utc>> = entries
            .iter()
            .copied()
            .filter(|ts| *ts >= window_start)
            .collect();

        if in_window.len() >= max_requests as usize {
            return Ok(WindowDecision::Full {
                oldest: in_window.iter().min().copied().unwrap_or(now),
            });
        }

        entries.push_back(now);
        Ok(WindowDecision::Recorded)
    }

    async fn compact(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("rate-limit log lock poisoned".to_string()))?;

        let mut removed = 0u64;
        for entries in records.values_mut() {
            let len = entries.len();
            entries.retain(|ts| *ts >= before);
            removed += (len - entries.len()) as u64;
        }
        records.retain(|_, entries| !entries.is_empty());
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_records_outside_window_are_ignored() {
        let log = InMemoryRateLimitLog::new();
        for s in 0..3 {
            log.record_if_below("ns", "u1", t(s - 60), t(s), 3).await.unwrap();
        }

        let full = log.record_if_below("ns", "u1", t(3 - 60), t(3), 3).await.unwrap();
        assert_eq!(full, WindowDecision::Full { oldest: t(0) });

        // At t=61 the record from t=0 no longer counts.
        let ok = log.record_if_below("ns", "u1", t(1), t(61), 3).await.unwrap();
        assert_eq!(ok, WindowDecision::Recorded);
    }

    #[tokio::test]
    async fn test_compact_removes_only_old_records() {
        let log = InMemoryRateLimitLog::new();
        log.record_if_below("a", "u1", t(-60), t(0), 10).await.unwrap();
        log.record_if_below("a", "u1", t(-50), t(10), 10).await.unwrap();
        log.record_if_below("b", "u2", t(-60), t(0), 10).await.unwrap();

        let removed = log.compact(t(5)).await.unwrap();
        assert_eq!(removed, 2);

        let records = log.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[&("a".to_string(), "u1".to_string())].len(), 1);
    }
}
