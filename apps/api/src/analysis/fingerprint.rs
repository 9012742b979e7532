//! Cache-key fingerprints over analysis inputs.
//!
//! Each field is written as an 8-byte big-endian length followed by its bytes,
//! so no choice of field contents can make two different input triples encode
//! to the same byte stream. A leading domain tag separates requester-scoped
//! fingerprints from shared ones.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

const PER_REQUESTER_TAG: &[u8] = b"analysis-fingerprint/v1/requester";
const SHARED_TAG: &[u8] = b"analysis-fingerprint/v1/shared";

/// SHA-256 digest identifying one analysis input.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint scoped to one requester: identical documents and job
    /// descriptions from different requesters never share a cache entry.
    pub fn of(document_text: &str, task_text: &str, requester_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(PER_REQUESTER_TAG);
        write_field(&mut hasher, document_text);
        write_field(&mut hasher, task_text);
        write_field(&mut hasher, requester_id);
        Self(hasher.finalize().into())
    }

    /// Content-only fingerprint, shared by every requester.
    pub fn shared(document_text: &str, task_text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(SHARED_TAG);
        write_field(&mut hasher, document_text);
        write_field(&mut hasher, task_text);
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn write_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

/// Whether cached results are isolated per requester or shared by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    PerRequester,
    Shared,
}

impl CacheScope {
    pub fn fingerprint(self, document_text: &str, task_text: &str, requester_id: &str) -> Fingerprint {
        match self {
            CacheScope::PerRequester => Fingerprint::of(document_text, task_text, requester_id),
            CacheScope::Shared => Fingerprint::shared(document_text, task_text),
        }
    }
}

impl FromStr for CacheScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "requester" | "per_requester" => Ok(CacheScope::PerRequester),
            "shared" => Ok(CacheScope::Shared),
            other => Err(format!("expected 'requester' or 'shared', got '{other}'")),
        }
    }
}
