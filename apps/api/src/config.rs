use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::http::HeaderName;

use crate::analysis::fingerprint::CacheScope;
use crate::rate_limit::{FailMode, MAX_WINDOW};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or any value is malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub rate_limit: RateLimitConfig,
    pub cache_ttl: Duration,
    pub cache_scope: CacheScope,
    /// Deadline for a whole analysis request, covering fetch, model call and store I/O.
    pub request_timeout: Duration,
    pub model_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_upload_bytes: usize,
    /// Header carrying the authenticated requester id. Only set this when an
    /// upstream auth proxy strips or overwrites the header on every request;
    /// when unset, requesters are identified by peer address alone.
    pub requester_header: Option<HeaderName>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub fail_mode: FailMode,
    pub compact_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let max_requests: u32 = env_or("RATE_LIMIT_MAX_REQUESTS", 10)?;
        if max_requests == 0 {
            return Err(anyhow!("RATE_LIMIT_MAX_REQUESTS must be at least 1"));
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            rate_limit: RateLimitConfig {
                max_requests,
                window: bounded_secs_env_or("RATE_LIMIT_WINDOW_SECS", 60, MAX_WINDOW)?,
                fail_mode: env_or("RATE_LIMIT_FAIL_MODE", FailMode::Closed)?,
                compact_interval: secs_env_or("RATE_LIMIT_COMPACT_INTERVAL_SECS", 300)?,
            },
            cache_ttl: secs_env_or("CACHE_TTL_SECS", 3600)?,
            cache_scope: env_or("CACHE_SCOPE", CacheScope::PerRequester)?,
            request_timeout: secs_env_or("REQUEST_TIMEOUT_SECS", 90)?,
            model_timeout: secs_env_or("MODEL_TIMEOUT_SECS", 60)?,
            fetch_timeout: secs_env_or("FETCH_TIMEOUT_SECS", 15)?,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            requester_header: optional_env("REQUESTER_HEADER")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}

/// Unset or blank means `None`; anything else must parse.
fn optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{key} has an invalid value '{raw}': {e}")),
        _ => Ok(None),
    }
}

/// Upper bound for any configured duration.
const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Durations are configured in whole seconds and must be non-zero.
fn secs_env_or(key: &str, default_secs: u64) -> Result<Duration> {
    bounded_secs_env_or(key, default_secs, MAX_DURATION)
}

fn bounded_secs_env_or(key: &str, default_secs: u64, max: Duration) -> Result<Duration> {
    let secs: u64 = env_or(key, default_secs)?;
    if secs == 0 {
        return Err(anyhow!("{key} must be greater than zero"));
    }
    let value = Duration::from_secs(secs);
    if value > max {
        return Err(anyhow!("{key} must be at most {} seconds", max.as_secs()));
    }
    Ok(value)
}

#[cfg(test)]
impl Config {
    /// Defaults without touching the process environment.
    pub fn test_default() -> Self {
        Config {
            database_url: "postgres://localhost/test".to_string(),
            redis_url: "redis://localhost".to_string(),
            anthropic_api_key: "test-key".to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            rate_limit: RateLimitConfig {
                max_requests: 10,
                window: Duration::from_secs(60),
                fail_mode: FailMode::Closed,
                compact_interval: Duration::from_secs(300),
            },
            cache_ttl: Duration::from_secs(3600),
            cache_scope: CacheScope::PerRequester,
            request_timeout: Duration::from_secs(90),
            model_timeout: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(15),
            max_upload_bytes: 1024 * 1024,
            requester_header: Some(HeaderName::from_static("x-user-id")),
        }
    }
}
