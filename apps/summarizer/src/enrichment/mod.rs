//! External Enrichment Client — best-effort company/role context from a search provider.
//!
//! `enrich` never fails: after retries are exhausted (or on a non-retryable error) it returns
//! an explicit "no enrichment available" result and the pipeline carries on without it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::TtlStore;
use crate::fingerprint::{query_fingerprint, sanitize_text};
use crate::retry::RetryPolicy;

pub mod tavily;

pub use tavily::TavilyProvider;

const MAX_HEADLINE_CHARS: usize = 120;
const QUERY_SUFFIX: &str = "company overview";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub title: String,
    pub content: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub query: String,
    pub snippets: Vec<Snippet>,
    pub status: EnrichmentStatus,
}

impl EnrichmentResult {
    pub fn unavailable(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            snippets: Vec::new(),
            status: EnrichmentStatus::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == EnrichmentStatus::Available && !self.snippets.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("transient search failure: {0}")]
    Transient(String),

    #[error("search request rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<Vec<Snippet>, SearchError>;
}

/// Used when no search API key is configured.
pub struct DisabledProvider;

#[async_trait]
impl SearchProvider for DisabledProvider {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn search(&self, _query: &str) -> Result<Vec<Snippet>, SearchError> {
        Err(SearchError::Rejected("no search provider configured".to_string()))
    }
}

pub struct EnrichmentClient {
    provider: Arc<dyn SearchProvider>,
    store: Arc<dyn TtlStore>,
    retry: RetryPolicy,
    call_timeout: Duration,
    ttl: Duration,
}

impl EnrichmentClient {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        store: Arc<dyn TtlStore>,
        retry: RetryPolicy,
        call_timeout: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            retry,
            call_timeout,
            ttl,
        }
    }

    pub async fn enrich(&self, query: &str) -> EnrichmentResult {
        let query = sanitize_text(query);
        if query.is_empty() {
            return EnrichmentResult::unavailable(query);
        }

        let key = format!("enrich:{}", query_fingerprint(&query));
        if let Some(cached) = self.cached(&key).await {
            debug!(%query, "Enrichment cache hit");
            return cached;
        }

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.delay_for(attempt - 1);
                debug!(provider = self.provider.name(), attempt, "Retrying search after {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.call_timeout, self.provider.search(&query)).await {
                Ok(Ok(snippets)) => {
                    let result = EnrichmentResult {
                        query: query.clone(),
                        snippets,
                        status: EnrichmentStatus::Available,
                    };
                    if result.is_available() {
                        self.store_result(&key, &result).await;
                    }
                    info!(
                        provider = self.provider.name(),
                        snippets = result.snippets.len(),
                        "Enrichment fetched"
                    );
                    return result;
                }
                Ok(Err(SearchError::Rejected(msg))) => {
                    warn!(provider = self.provider.name(), "Enrichment unavailable: {msg}");
                    return EnrichmentResult::unavailable(query);
                }
                Ok(Err(SearchError::Transient(msg))) => {
                    warn!(provider = self.provider.name(), attempt, "Transient search error: {msg}");
                }
                Err(_) => {
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        "Search timed out after {:?}",
                        self.call_timeout
                    );
                }
            }
        }

        warn!(
            provider = self.provider.name(),
            attempts = self.retry.max_attempts,
            "Enrichment retries exhausted, continuing without context"
        );
        EnrichmentResult::unavailable(query)
    }

    async fn cached(&self, key: &str) -> Option<EnrichmentResult> {
        match self.store.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .map_err(|e| warn!("Discarding undecodable enrichment entry: {e}"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Enrichment cache read failed, treating as miss: {e}");
                None
            }
        }
    }

    async fn store_result(&self, key: &str, result: &EnrichmentResult) {
        let Ok(value) = serde_json::to_string(result) else {
            return;
        };
        if let Err(e) = self.store.put_if_absent(key, value, self.ttl).await {
            warn!("Enrichment cache write skipped: {e}");
        }
    }
}

/// Builds the search query from a normalized posting: its headline plus a fixed suffix.
pub fn build_query(normalized_text: &str) -> String {
    let headline = normalized_text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let headline: String = headline.chars().take(MAX_HEADLINE_CHARS).collect();

    if headline.is_empty() {
        String::new()
    } else {
        format!("{} {QUERY_SUFFIX}", headline.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::cache::test_support::UnavailableStore;
    use crate::cache::MemoryStore;

    struct ScriptedProvider {
        calls: AtomicUsize,
        fail_first: usize,
        error: fn() -> SearchError,
    }

    impl ScriptedProvider {
        fn failing(fail_first: usize, error: fn() -> SearchError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
                error,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn search(&self, query: &str) -> Result<Vec<Snippet>, SearchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err((self.error)());
            }
            Ok(vec![Snippet {
                title: "Acme".to_string(),
                content: format!("Facts about {query}"),
                source_url: "https://acme.example/about".to_string(),
            }])
        }
    }

    fn transient() -> SearchError {
        SearchError::Transient("502 bad gateway".to_string())
    }

    fn rejected() -> SearchError {
        SearchError::Rejected("401 unauthorized".to_string())
    }

    fn client(provider: Arc<ScriptedProvider>, store: Arc<dyn TtlStore>) -> EnrichmentClient {
        EnrichmentClient::new(
            provider,
            store,
            RetryPolicy::new(3, Duration::from_millis(100)).without_jitter(),
            Duration::from_secs(5),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let provider = Arc::new(ScriptedProvider::failing(0, transient));
        let client = client(provider.clone(), Arc::new(MemoryStore::new()));

        let first = client.enrich("Acme Backend Engineer company overview").await;
        let second = client.enrich("acme  backend engineer COMPANY overview").await;

        assert!(first.is_available());
        assert_eq!(first.snippets, second.snippets);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_then_succeed() {
        let provider = Arc::new(ScriptedProvider::failing(2, transient));
        let client = client(provider.clone(), Arc::new(MemoryStore::new()));

        let result = client.enrich("Acme").await;

        assert!(result.is_available());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_unavailable() {
        let provider = Arc::new(ScriptedProvider::failing(usize::MAX, transient));
        let client = client(provider.clone(), Arc::new(MemoryStore::new()));
        let started = Instant::now();

        let result = client.enrich("Acme").await;

        assert_eq!(result.status, EnrichmentStatus::Unavailable);
        assert!(result.snippets.is_empty());
        assert_eq!(provider.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_rejected_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::failing(usize::MAX, rejected));
        let client = client(provider.clone(), Arc::new(MemoryStore::new()));

        let result = client.enrich("Acme").await;

        assert!(!result.is_available());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_result_is_not_cached() {
        let provider = Arc::new(ScriptedProvider::failing(1, rejected));
        let client = client(provider.clone(), Arc::new(MemoryStore::new()));

        assert!(!client.enrich("Acme").await.is_available());
        assert!(client.enrich("Acme").await.is_available());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_outage_still_fetches() {
        let provider = Arc::new(ScriptedProvider::failing(0, transient));
        let client = client(provider.clone(), Arc::new(UnavailableStore));

        assert!(client.enrich("Acme").await.is_available());
    }

    #[tokio::test]
    async fn test_disabled_provider_yields_unavailable() {
        let client = EnrichmentClient::new(
            Arc::new(DisabledProvider),
            Arc::new(MemoryStore::new()),
            RetryPolicy::new(3, Duration::from_millis(1)),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        assert_eq!(
            client.enrich("Acme").await.status,
            EnrichmentStatus::Unavailable
        );
    }

    #[test]
    fn test_build_query_uses_headline() {
        let text = "Senior Backend Engineer at Acme\n\nWe build payments infrastructure.";
        assert_eq!(
            build_query(text),
            "Senior Backend Engineer at Acme company overview"
        );
        assert_eq!(build_query("   \n"), "");
    }

    #[test]
    fn test_build_query_truncates_long_headlines() {
        let text = "x".repeat(500);
        let query = build_query(&text);
        assert_eq!(query.len(), MAX_HEADLINE_CHARS + 1 + QUERY_SUFFIX.len());
    }
}
