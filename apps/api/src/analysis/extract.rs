//! Document acquisition and text extraction.
//!
//! A résumé arrives either as upload bytes or as a URL to fetch. Fetch
//! problems, unreadable documents and documents with no text are all
//! extraction failures, never model failures.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Invalid resume URL: {0}")]
    InvalidUrl(String),

    #[error("Resume URL could not be fetched: {0}")]
    Unreachable(String),

    #[error("Resume URL points to a non-public address: {0}")]
    ForbiddenHost(String),

    #[error("Resume URL returned status {0}")]
    BadStatus(u16),

    #[error("Resume exceeds the {limit}-byte size limit")]
    TooLarge { limit: usize },

    #[error("Timed out fetching resume")]
    Timeout,

    #[error("Resume could not be read as a PDF: {0}")]
    Unreadable(String),

    #[error("Unable to extract text from resume")]
    EmptyText,
}

impl ExtractionError {
    /// True when the document itself was fetched but cannot be parsed.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, ExtractionError::Unreadable(_))
    }
}

/// Where the résumé comes from. Exactly one per request.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Upload(Bytes),
    Url(String),
}

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, ExtractionError>;
}

/// Opaque `bytes -> text` capability.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: Bytes) -> Result<String, ExtractionError>;
}

const MAX_REDIRECTS: usize = 5;

/// Fetches résumé URLs over HTTP(S) with a timeout and a size cap.
///
/// Hosts that resolve to loopback, private, link-local or otherwise
/// non-public addresses are refused, as are redirects to such literals.
pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::custom(|attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else if literal_host_is_forbidden(attempt.url()) {
                    attempt.error("redirect to a non-public address")
                } else {
                    attempt.follow()
                }
            }))
            .build()?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ExtractionError> {
        let url = parse_document_url(url)?;
        ensure_public_host(&url).await?;

        let mut response = self.client.get(url.clone()).send().await.map_err(map_fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!("Resume fetch from {url} returned {status}");
            return Err(ExtractionError::BadStatus(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(ExtractionError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(map_fetch_error)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ExtractionError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes from {url}", body.len());
        Ok(body.freeze())
    }
}

fn parse_document_url(raw: &str) -> Result<Url, ExtractionError> {
    let url = Url::parse(raw.trim()).map_err(|e| ExtractionError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ExtractionError::InvalidUrl(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

async fn ensure_public_host(url: &Url) -> Result<(), ExtractionError> {
    let host = url
        .host_str()
        .ok_or_else(|| ExtractionError::InvalidUrl("missing host".to_string()))?;
    let port = url.port_or_known_default().unwrap_or(443);
    // IPv6 literals come back bracketed from `host_str`.
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ExtractionError::Unreachable(format!("cannot resolve {host}: {e}")))?
        .map(|addr| addr.ip())
        .collect();

    if addrs.is_empty() {
        return Err(ExtractionError::Unreachable(format!("{host} has no addresses")));
    }
    if let Some(blocked) = addrs.iter().find(|ip| !is_public_ip(ip)) {
        warn!("Refusing resume fetch from {host} ({blocked})");
        return Err(ExtractionError::ForbiddenHost(host.to_string()));
    }
    Ok(())
}

fn literal_host_is_forbidden(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return true;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    match host.parse::<IpAddr>() {
        Ok(ip) => !is_public_ip(&ip),
        Err(_) => host.eq_ignore_ascii_case("localhost"),
    }
}

fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(&v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..128).contains(&b))
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b == 18 || b == 19))
        || a >= 240)
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80)
}

fn map_fetch_error(e: reqwest::Error) -> ExtractionError {
    if e.is_timeout() {
        ExtractionError::Timeout
    } else {
        ExtractionError::Unreachable(e.to_string())
    }
}

/// PDF text extraction via `pdf-extract`, run on the blocking pool.
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, document: Bytes) -> Result<String, ExtractionError> {
        // pdf-extract is CPU-bound and can panic on hostile input; a panic in
        // the blocking task surfaces as a JoinError.
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&document))
            .await
            .map_err(|e| ExtractionError::Unreadable(format!("extractor aborted: {e}")))?
            .map_err(|e| ExtractionError::Unreadable(e.to_string()))
    }
}
