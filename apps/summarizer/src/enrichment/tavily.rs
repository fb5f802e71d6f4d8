//! Tavily search API provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::enrichment::{SearchError, SearchProvider, Snippet};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const DEFAULT_MAX_RESULTS: u32 = 5;

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl From<TavilyResult> for Snippet {
    fn from(r: TavilyResult) -> Self {
        Snippet {
            title: r.title,
            content: r.content,
            source_url: r.url,
        }
    }
}

pub struct TavilyProvider {
    client: Client,
    api_key: String,
    max_results: u32,
}

impl TavilyProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            max_results: DEFAULT_MAX_RESULTS,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<Vec<Snippet>, SearchError> {
        let response = self
            .client
            .post(TAVILY_SEARCH_URL)
            .json(&TavilyRequest {
                api_key: &self.api_key,
                query,
                max_results: self.max_results,
                search_depth: "basic",
            })
            .send()
            .await
            .map_err(|e| SearchError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Transient(format!("unreadable response body: {e}")))?;

        Ok(into_snippets(parsed))
    }
}

fn classify_status(status: StatusCode, body: String) -> SearchError {
    let message = format!("{status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        SearchError::Transient(message)
    } else {
        SearchError::Rejected(message)
    }
}

/// Drops results with no usable content.
fn into_snippets(response: TavilyResponse) -> Vec<Snippet> {
    response
        .results
        .into_iter()
        .filter(|r| !r.content.trim().is_empty())
        .map(Snippet::from)
        .collect()
}
