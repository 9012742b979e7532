//! Fakes shared by the pipeline and route tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::analysis::extract::{DocumentFetcher, DocumentSource, ExtractionError, TextExtractor};
use crate::analysis::fingerprint::CacheScope;
use crate::analysis::pipeline::{AnalysisInput, Pipeline, PipelineDeps, PipelineSettings};
use crate::analysis::schema::AnalysisTask;
use crate::cache::memory::InMemoryCacheStore;
use crate::cache::CacheStore;
use crate::clock::ManualClock;
use crate::llm_client::{LlmError, ModelInvoker, Prompt};
use crate::rate_limit::memory::InMemoryRateLimitLog;
use crate::rate_limit::{Admission, Admitted, FailMode};
use crate::store::StoreError;

pub const FIT_RESPONSE: &str = r#"```json
{
  "matchPercentage": "72%",
  "missingSkills": ["Kubernetes"],
  "strengths": ["Go", "PostgreSQL"],
  "roadmap": ["Week 1: Kubernetes basics"],
  "resumeRewrite": "Backend engineer with 5 years of Go."
}
```"#;

pub const ATS_RESPONSE: &str = r#"{"atsScore": 81, "keywordMatch": ["Go"], "missingKeywords": ["Kubernetes"], "suggestions": ["Mention Kubernetes"], "summary": "Strong backend fit"}"#;

/// Scripted model: returns a fixed reply (or fails) and counts calls.
pub struct FakeInvoker {
    reply: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl FakeInvoker {
    pub fn returning(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Self::returning("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ModelInvoker for FakeInvoker {
    async fn invoke(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().ok_or(LlmError::Unavailable {
            status: Some(503),
            message: "overloaded".to_string(),
        })
    }
}

/// Serves registered URLs; everything else is a 404.
#[derive(Default)]
pub struct FakeFetcher {
    documents: Mutex<HashMap<String, Bytes>>,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, text: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::copy_from_slice(text.as_bytes()));
    }
}

#[async_trait]
impl DocumentFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ExtractionError> {
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(ExtractionError::BadStatus(404))
    }
}

/// Treats document bytes as UTF-8 text.
#[derive(Default)]
pub struct FakeExtractor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, document: Bytes) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        String::from_utf8(document.to_vec())
            .map_err(|e| ExtractionError::Unreadable(e.to_string()))
    }
}

/// A store where every key already exists and nothing is ever readable.
pub struct NeverStoresCache;

#[async_trait]
impl CacheStore for NeverStoresCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn put_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        max_requests: 10,
        window: Duration::from_secs(60),
        fail_mode: FailMode::Closed,
        cache_ttl: Duration::from_secs(3600),
        cache_scope: CacheScope::PerRequester,
        request_timeout: Duration::from_secs(30),
    }
}

/// All fakes wired together, sharing one clock and one set of stores.
pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub invoker: Arc<FakeInvoker>,
    pub fetcher: Arc<FakeFetcher>,
    pub extractor: Arc<FakeExtractor>,
    pub cache_store: Arc<InMemoryCacheStore>,
    pub rate_log: Arc<InMemoryRateLimitLog>,
}

impl TestHarness {
    pub fn new(invoker: FakeInvoker) -> Self {
        let clock = Arc::new(ManualClock::new());
        Self {
            cache_store: Arc::new(InMemoryCacheStore::new(clock.clone())),
            rate_log: Arc::new(InMemoryRateLimitLog::new()),
            fetcher: Arc::new(FakeFetcher::default()),
            extractor: Arc::new(FakeExtractor::default()),
            invoker: Arc::new(invoker),
            clock,
        }
    }

    pub fn deps(&self) -> PipelineDeps {
        PipelineDeps {
            fetcher: self.fetcher.clone(),
            extractor: self.extractor.clone(),
            invoker: self.invoker.clone(),
            cache_store: self.cache_store.clone(),
            rate_log: self.rate_log.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn pipeline<T: AnalysisTask>(&self) -> Pipeline<T> {
        self.pipeline_with(&settings())
    }

    pub fn pipeline_with<T: AnalysisTask>(&self, settings: &PipelineSettings) -> Pipeline<T> {
        Pipeline::new(&self.deps(), settings)
    }
}

/// Builds a pipeline around a custom cache store.
pub fn build_pipeline<T: AnalysisTask>(
    invoker: Arc<FakeInvoker>,
    cache_store: Arc<dyn CacheStore>,
    clock: Arc<ManualClock>,
    settings: &PipelineSettings,
) -> Pipeline<T> {
    let deps = PipelineDeps {
        fetcher: Arc::new(FakeFetcher::default()),
        extractor: Arc::new(FakeExtractor::default()),
        invoker,
        cache_store,
        rate_log: Arc::new(InMemoryRateLimitLog::new()),
        clock,
    };
    Pipeline::new(&deps, settings)
}

pub async fn admit<T: AnalysisTask>(pipeline: &Pipeline<T>, requester: &str) -> Admitted {
    match pipeline.admit(requester).await.unwrap() {
        Admission::Allowed(admitted) => admitted,
        Admission::Denied { retry_after } => {
            panic!("{requester} unexpectedly denied, retry after {retry_after:?}")
        }
    }
}

pub fn upload(document_text: &str, task_text: &str) -> AnalysisInput {
    AnalysisInput {
        task_text: task_text.to_string(),
        source: Some(DocumentSource::Upload(Bytes::copy_from_slice(
            document_text.as_bytes(),
        ))),
    }
}
