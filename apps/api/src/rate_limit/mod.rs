//! Sliding-window rate limiting.
//!
//! Every admitted request appends a timestamped record to a [`RateLimitLog`].
//! A request is admitted only while fewer than `max_requests` records for the
//! same requester fall inside the trailing window. Denied requests record
//! nothing, so a client that keeps retrying past the limit is admitted again
//! as soon as its oldest record leaves the window.
//!
//! Each pipeline owns its own namespace in the log, so load on one pipeline
//! never consumes the other's budget.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::store::StoreError;

/// Outcome of an atomic count-then-append against the log.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowDecision {
    /// Fewer than the threshold were in the window; a record was appended at `now`.
    Recorded,
    /// The window is full. `oldest` is the earliest record still inside it.
    Full { oldest: DateTime<Utc> },
}

/// Append-only timestamped log with range counting.
///
/// Implementations must perform the count and the append in
/// `record_if_below` atomically per `(namespace, requester)`, so concurrent
/// admissions cannot overshoot the threshold.
#[async_trait]
pub trait RateLimitLog: Send + Sync {
    async fn record_if_below(
        &self,
        namespace: &str,
        requester: &str,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
        max_requests: u32,
    ) -> Result<WindowDecision, StoreError>;

    /// Deletes records older than `before` across all namespaces.
    /// Returns the number of records removed.
    async fn compact(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// What to do when the backing log cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Report an internal error; nothing is admitted.
    Closed,
    /// Log a warning and admit the request unrecorded.
    Open,
}

impl FromStr for FailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "closed" => Ok(FailMode::Closed),
            "open" => Ok(FailMode::Open),
            other => Err(format!("expected 'closed' or 'open', got '{other}'")),
        }
    }
}

/// Proof that a request passed the rate limiter.
///
/// Only [`RateLimiter::admit`] can construct one, and the pipeline refuses to
/// run without it, so extraction and model work can never precede admission.
#[derive(Debug)]
pub struct Admitted {
    namespace: &'static str,
    requester: String,
}

impl Admitted {
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }
}

#[derive(Debug)]
pub enum Admission {
    Allowed(Admitted),
    Denied { retry_after: Duration },
}

/// Longest accepted window. Keeps timestamp arithmetic far from overflow.
pub const MAX_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RateLimiter {
    namespace: &'static str,
    log: Arc<dyn RateLimitLog>,
    clock: Arc<dyn Clock>,
    max_requests: u32,
    window: Duration,
    fail_mode: FailMode,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(
        namespace: &'static str,
        log: Arc<dyn RateLimitLog>,
        clock: Arc<dyn Clock>,
        max_requests: u32,
        window: Duration,
        fail_mode: FailMode,
    ) -> Self {
        Self {
            namespace,
            log,
            clock,
            max_requests,
            window: window.min(MAX_WINDOW),
            fail_mode,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bounds each log call. Expiry counts as a store failure and is
    /// handled according to the fail mode.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Admits or denies one request from `requester`.
    ///
    /// Returns `Err` only when the log is unreachable and the limiter fails
    /// closed; callers must keep that distinct from `Denied`.
    pub async fn admit(&self, requester: &str) -> Result<Admission, StoreError> {
        let now = self.clock.now();
        let window = chrono_window(self.window);
        let window_start = now - window;

        let decision = tokio::time::timeout(
            self.store_timeout,
            self.log.record_if_below(
                self.namespace,
                requester,
                window_start,
                now,
                self.max_requests,
            ),
        )
        .await
        .unwrap_or(Err(StoreError::Timeout));

        match decision {
            Ok(WindowDecision::Recorded) => {
                debug!(namespace = self.namespace, requester, "Request admitted");
                Ok(Admission::Allowed(self.token(requester)))
            }
            Ok(WindowDecision::Full { oldest }) => {
                // The oldest record leaves the window at `oldest + window`.
                let retry_after = (oldest + window - now)
                    .to_std()
                    .unwrap_or(Duration::from_secs(1))
                    .clamp(Duration::from_secs(1), self.window);
                info!(
                    namespace = self.namespace,
                    requester,
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limit exceeded"
                );
                Ok(Admission::Denied { retry_after })
            }
            Err(e) => match self.fail_mode {
                FailMode::Open => {
                    warn!(
                        namespace = self.namespace,
                        requester, "Rate-limit store unavailable, failing open: {e}"
                    );
                    Ok(Admission::Allowed(self.token(requester)))
                }
                FailMode::Closed => {
                    error!(
                        namespace = self.namespace,
                        requester, "Rate-limit store unavailable: {e}"
                    );
                    Err(e)
                }
            },
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.log.ping().await
    }

    fn token(&self, requester: &str) -> Admitted {
        Admitted {
            namespace: self.namespace,
            requester: requester.to_string(),
        }
    }
}

/// `window` is clamped to [`MAX_WINDOW`], so the conversion cannot fail.
fn chrono_window(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window.min(MAX_WINDOW)).unwrap_or_else(|_| chrono::Duration::weeks(1))
}

/// Periodically deletes records that have fallen out of the window.
/// Records are kept for one extra window so in-flight checks never lose data.
pub fn spawn_compaction(
    log: Arc<dyn RateLimitLog>,
    clock: Arc<dyn Clock>,
    window: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let retention = chrono_window(window) * 2;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match log.compact(clock.now() - retention).await {
                Ok(0) => {}
                Ok(removed) => debug!("Compacted {removed} expired rate-limit records"),
                Err(e) => warn!("Rate-limit compaction failed: {e}"),
            }
        }
    })
}
