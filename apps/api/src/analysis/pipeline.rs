//! Analysis pipeline, one instance per task kind.
//!
//! Flow: admit → extract → fingerprint → cache lookup → (hit: done) →
//!       single-flight → cache re-check → invoke model → parse → persist → done.
//!
//! Nothing is retried. Every failure ends the request and is mapped to a
//! caller-visible error at the HTTP boundary.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analysis::extract::{DocumentFetcher, DocumentSource, ExtractionError, TextExtractor};
use crate::analysis::fingerprint::{CacheScope, Fingerprint};
use crate::analysis::parser::{parse_output, ParseError};
use crate::analysis::schema::AnalysisTask;
use crate::analysis::single_flight::SingleFlight;
use crate::cache::{CacheStore, CachedResult, PutOutcome, ResultCache};
use crate::clock::Clock;
use crate::llm_client::{LlmError, ModelInvoker};
use crate::rate_limit::{Admission, Admitted, FailMode, RateLimitLog, RateLimiter};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Model invocation failed: {0}")]
    Model(#[from] LlmError),

    #[error(transparent)]
    OutputParse(#[from] ParseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller input, already separated from transport concerns.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub task_text: String,
    pub source: Option<DocumentSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome<T> {
    pub cached: bool,
    pub payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Extracting,
    Fingerprinting,
    CacheLookup,
    CacheHit,
    CacheMiss,
    Invoking,
    Parsing,
    Persisting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extracting => "extracting",
            Stage::Fingerprinting => "fingerprinting",
            Stage::CacheLookup => "cache_lookup",
            Stage::CacheHit => "cache_hit",
            Stage::CacheMiss => "cache_miss",
            Stage::Invoking => "invoking",
            Stage::Parsing => "parsing",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Explicitly constructed collaborators shared by every pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub extractor: Arc<dyn TextExtractor>,
    pub invoker: Arc<dyn ModelInvoker>,
    pub cache_store: Arc<dyn CacheStore>,
    pub rate_log: Arc<dyn RateLimitLog>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_requests: u32,
    pub window: Duration,
    pub fail_mode: FailMode,
    pub cache_ttl: Duration,
    pub cache_scope: CacheScope,
    pub request_timeout: Duration,
}

pub struct Pipeline<T> {
    limiter: RateLimiter,
    cache: ResultCache<T>,
    fetcher: Arc<dyn DocumentFetcher>,
    extractor: Arc<dyn TextExtractor>,
    invoker: Arc<dyn ModelInvoker>,
    flights: SingleFlight,
    scope: CacheScope,
    request_timeout: Duration,
}

impl<T: AnalysisTask> Pipeline<T> {
    pub fn new(deps: &PipelineDeps, settings: &PipelineSettings) -> Self {
        let namespace = T::KIND.namespace();
        Self {
            limiter: RateLimiter::new(
                namespace,
                deps.rate_log.clone(),
                deps.clock.clone(),
                settings.max_requests,
                settings.window,
                settings.fail_mode,
            )
            .with_store_timeout(settings.request_timeout),
            cache: ResultCache::new(
                namespace,
                deps.cache_store.clone(),
                deps.clock.clone(),
                settings.cache_ttl,
            ),
            fetcher: deps.fetcher.clone(),
            extractor: deps.extractor.clone(),
            invoker: deps.invoker.clone(),
            flights: SingleFlight::new(),
            scope: settings.cache_scope,
            request_timeout: settings.request_timeout,
        }
    }

    /// Rate-limit gate. Must succeed before [`Pipeline::run`] can be called.
    /// The log call is bounded by the request timeout.
    pub async fn admit(&self, requester: &str) -> Result<Admission, StoreError> {
        self.limiter.admit(requester).await
    }

    /// Checks both backing stores.
    pub async fn ready(&self) -> Result<(), StoreError> {
        self.limiter.ping().await?;
        self.cache.ping().await
    }

    pub async fn run(
        &self,
        admitted: Admitted,
        input: AnalysisInput,
    ) -> Result<AnalysisOutcome<T>, PipelineError> {
        let span = info_span!(
            "analysis",
            task = T::KIND.namespace(),
            request_id = %Uuid::new_v4(),
            requester = admitted.requester(),
        );
        let deadline = Instant::now() + self.request_timeout;

        let result = self.execute(&admitted, input, deadline).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| warn!("Analysis failed: {e}"));
        }
        result
    }

    async fn execute(
        &self,
        admitted: &Admitted,
        input: AnalysisInput,
        deadline: Instant,
    ) -> Result<AnalysisOutcome<T>, PipelineError> {
        if admitted.namespace() != T::KIND.namespace() {
            return Err(PipelineError::Internal(format!(
                "admission for '{}' presented to '{}' pipeline",
                admitted.namespace(),
                T::KIND.namespace()
            )));
        }
        let requester = admitted.requester();

        if input.task_text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "Job description is required".to_string(),
            ));
        }
        let source = input
            .source
            .ok_or_else(|| PipelineError::Validation("Resume is required".to_string()))?;

        debug!(stage = %Stage::Extracting);
        let document_text = self.extract(source, deadline).await?;
        info!("Extracted resume text: {} chars", document_text.chars().count());

        debug!(stage = %Stage::Fingerprinting);
        let fingerprint = self
            .scope
            .fingerprint(&document_text, &input.task_text, requester);

        debug!(stage = %Stage::CacheLookup, fingerprint = %fingerprint.short());
        if let Some(hit) = self.lookup(&fingerprint, deadline).await? {
            return Ok(self.cache_hit(&fingerprint, hit));
        }

        debug!(stage = %Stage::CacheMiss, fingerprint = %fingerprint.short());
        let _flight = timeout_at(deadline, self.flights.acquire(&self.cache.key(&fingerprint)))
            .await
            .map_err(|_| LlmError::Timeout)?;

        // A concurrent request for the same input may have finished while we waited.
        if let Some(hit) = self.lookup(&fingerprint, deadline).await? {
            return Ok(self.cache_hit(&fingerprint, hit));
        }

        debug!(stage = %Stage::Invoking, fingerprint = %fingerprint.short());
        let prompt = T::prompt(&document_text, &input.task_text);
        let raw = timeout_at(deadline, self.invoker.invoke(&prompt))
            .await
            .map_err(|_| LlmError::Timeout)??;

        debug!(stage = %Stage::Parsing, fingerprint = %fingerprint.short());
        let payload = parse_output::<T>(&raw)?;

        debug!(stage = %Stage::Persisting, fingerprint = %fingerprint.short());
        self.persist(&fingerprint, requester, payload.clone(), deadline)
            .await;

        debug!(stage = %Stage::Done, cached = false);
        Ok(AnalysisOutcome {
            cached: false,
            payload,
        })
    }

    async fn extract(
        &self,
        source: DocumentSource,
        deadline: Instant,
    ) -> Result<String, PipelineError> {
        let document = match source {
            DocumentSource::Upload(bytes) => {
                if bytes.is_empty() {
                    return Err(PipelineError::Validation(
                        "Resume file is empty".to_string(),
                    ));
                }
                bytes
            }
            DocumentSource::Url(url) => timeout_at(deadline, self.fetcher.fetch(&url))
                .await
                .map_err(|_| ExtractionError::Timeout)??,
        };

        let text = timeout_at(deadline, self.extractor.extract(document))
            .await
            .map_err(|_| ExtractionError::Timeout)??;

        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyText.into());
        }
        Ok(text)
    }

    async fn lookup(
        &self,
        fingerprint: &Fingerprint,
        deadline: Instant,
    ) -> Result<Option<CachedResult<T>>, PipelineError> {
        let hit = timeout_at(deadline, self.cache.get(fingerprint))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(hit)
    }

    fn cache_hit(&self, fingerprint: &Fingerprint, hit: CachedResult<T>) -> AnalysisOutcome<T> {
        info!(
            fingerprint = %fingerprint.short(),
            expires_at = %hit.expires_at,
            "Returning cached analysis"
        );
        debug!(stage = %Stage::CacheHit);
        debug!(stage = %Stage::Done, cached = true);
        AnalysisOutcome {
            cached: true,
            payload: hit.payload,
        }
    }

    /// The model call has already been paid for, so a failed write is logged
    /// and the fresh result is still returned.
    async fn persist(
        &self,
        fingerprint: &Fingerprint,
        requester: &str,
        payload: T,
        deadline: Instant,
    ) {
        match timeout_at(deadline, self.cache.put(fingerprint, requester, payload)).await {
            Ok(Ok(PutOutcome::Stored(entry))) => info!(
                fingerprint = %fingerprint.short(),
                expires_at = %entry.expires_at,
                "Cached analysis result"
            ),
            Ok(Ok(PutOutcome::AlreadyExists)) => info!(
                fingerprint = %fingerprint.short(),
                "Analysis already cached by a concurrent request"
            ),
            Ok(Err(e)) => error!(fingerprint = %fingerprint.short(), "Failed to cache analysis: {e}"),
            Err(_) => error!(fingerprint = %fingerprint.short(), "Timed out caching analysis"),
        }
    }
}
