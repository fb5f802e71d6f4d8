//! Result cache — fingerprint → validated summary, with TTL and first-writer-wins writes.
//!
//! The cache is a best-effort accelerator. Every failure of the backing store is logged and
//! degrades to a miss (reads) or a skipped write (puts); it never fails a run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fingerprint::Fingerprint;
use crate::models::JobSummary;
use crate::validator::ValidationVerdict;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// A key/value store with per-entry TTL. Shared by the result and enrichment caches.
///
/// `put_if_absent` is the only write: it must be atomic per key and return `true` only if
/// this call stored the value. An unexpired existing value is never overwritten.
#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn put_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError>;
}

/// A finalized, validated run output. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub output: JobSummary,
    pub verdict: ValidationVerdict,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

/// What happened to a `ResultCache::put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// Another run already stored an unexpired entry for this fingerprint.
    AlreadyPresent,
    /// The store could not be reached; nothing was written.
    Unavailable,
}

/// Typed view over a `TtlStore` for `CacheEntry` records. Cheap to clone.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn TtlStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let raw = match self.store.get(&result_key(fingerprint)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(%fingerprint, "Result cache read failed, treating as miss: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(%fingerprint, "Discarding undecodable result cache entry: {e}");
                None
            }
        }
    }

    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> PutOutcome {
        let value = match serde_json::to_string(entry) {
            Ok(v) => v,
            Err(e) => {
                warn!(%fingerprint, "Failed to serialize cache entry: {e}");
                return PutOutcome::Unavailable;
            }
        };

        match self
            .store
            .put_if_absent(&result_key(fingerprint), value, ttl)
            .await
        {
            Ok(true) => {
                debug!(%fingerprint, ttl_secs = ttl.as_secs(), "Result cache entry written");
                PutOutcome::Written
            }
            Ok(false) => PutOutcome::AlreadyPresent,
            Err(e) => {
                warn!(%fingerprint, "Result cache write skipped: {e}");
                PutOutcome::Unavailable
            }
        }
    }
}

fn result_key(fingerprint: &Fingerprint) -> String {
    format!("result:{fingerprint}")
}
