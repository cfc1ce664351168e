//! Multi-tier TTL cache (§4.4): best-effort, namespaced, opaque blobs.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Versioned so a future codec change can detect and discard stale blobs
/// rather than misinterpret them.
pub const CODEC_VERSION: u8 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub codec_version: u8,
    pub bytes: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(bytes: Vec<u8>, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            codec_version: CODEC_VERSION,
            bytes,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The namespace-qualified TTLs of §4.4's table.
pub mod ttl {
    use chrono::Duration;

    pub fn tool_result(tool: &str) -> Duration {
        match tool {
            "trending" => Duration::minutes(30),
            "url_ingest" => Duration::hours(24),
            _ => Duration::hours(1),
        }
    }

    pub fn pdf_content() -> Duration {
        Duration::days(7)
    }

    pub fn pdf_pages() -> Duration {
        Duration::days(7)
    }

    pub fn checkpoint() -> Duration {
        Duration::hours(24)
    }
}

/// Builds the `tool:<tool>:<md5(args)>` key shape of §4.4.
pub fn tool_result_key(tool: &str, args: &serde_json::Value) -> String {
    use md5::{Digest, Md5};
    let digest = Md5::digest(args.to_string().as_bytes());
    format!("tool:{tool}:{:x}", digest)
}

pub fn pdf_text_key(url: &str) -> String {
    format!("pdf:{url}")
}

pub fn pdf_pages_key(url: &str) -> String {
    format!("pdfpages:{url}")
}

pub fn checkpoint_key(session: &str, phase: &str) -> String {
    format!("ckpt:{session}:{phase}")
}

/// Narrow capability interface (§9 "dynamic dispatch"): `{get, set, delete}`.
/// Best-effort by contract — implementations must not let a read or write
/// failure propagate as a pipeline error (§4.4); callers log and carry on.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn delete(&self, key: &str);
}
