//! Axum route handlers for the Summaries API. No business logic lives here: requests
//! become `WorkItem`s, outcomes become JSON.

use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::batch::BatchItemResult;
use crate::errors::AppError;
use crate::fingerprint::Fingerprint;
use crate::models::{JobSummary, WorkItem};
use crate::state::AppState;
use crate::validator::DEFAULT_GUIDELINE_VERSION;

const MAX_BATCH_ITEMS: usize = 100;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

fn default_guideline_version() -> String {
    DEFAULT_GUIDELINE_VERSION.to_string()
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
    #[serde(default = "default_guideline_version")]
    pub guideline_version: String,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub work_item_id: Uuid,
    pub fingerprint: Fingerprint,
    pub posting_id: String,
    pub cached: bool,
    pub summary: JobSummary,
}

#[derive(Debug, Deserialize)]
pub struct BatchItemRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub text: String,
    #[serde(default = "default_guideline_version")]
    pub guideline_version: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<BatchItemRequest>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BatchItemResponse {
    pub work_item_id: Uuid,
    /// "succeeded" or "failed".
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResponse>,
}

impl From<BatchItemResult> for BatchItemResponse {
    fn from(result: BatchItemResult) -> Self {
        match result {
            BatchItemResult::Completed(outcome) => match outcome.result {
                Ok(summary) => BatchItemResponse {
                    work_item_id: outcome.work_item_id,
                    status: "succeeded",
                    summary: Some(summary),
                    error: None,
                },
                Err(e) => BatchItemResponse {
                    work_item_id: outcome.work_item_id,
                    status: "failed",
                    summary: None,
                    error: Some(ErrorBody {
                        code: e.code(),
                        message: e.public_message(),
                    }),
                },
            },
            BatchItemResult::Crashed {
                work_item_id,
                reason,
            } => {
                warn!(%work_item_id, "Batch item reported as internal error: {reason}");
                BatchItemResponse {
                    work_item_id,
                    status: "failed",
                    summary: None,
                    error: Some(ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "The run failed unexpectedly".to_string(),
                    }),
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/summaries
///
/// Runs one posting through the pipeline. Returns the finalized summary or a structured
/// failure carrying the pipeline's reason code.
pub async fn handle_summarize(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, AppError> {
    let item = WorkItem::new(request.text, request.guideline_version);
    let outcome = state.pipeline.run_with_cancel(&item, state.shutdown.clone()).await;
    let summary = outcome.result?;

    Ok(Json(SummarizeResponse {
        work_item_id: outcome.work_item_id,
        posting_id: outcome.fingerprint.posting_id(),
        fingerprint: outcome.fingerprint,
        cached: outcome.cached,
        summary,
    }))
}

/// POST /api/v1/summaries/batch
///
/// Always 200 once the batch is accepted: per-item failures are reported per item.
/// Results are returned in submission order.
pub async fn handle_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    if request.items.is_empty() {
        return Err(AppError::Validation("items cannot be empty".to_string()));
    }
    if request.items.len() > MAX_BATCH_ITEMS {
        return Err(AppError::Validation(format!(
            "a batch holds at most {MAX_BATCH_ITEMS} items"
        )));
    }

    let items: Vec<WorkItem> = request
        .items
        .into_iter()
        .map(|item| match item.id {
            Some(id) => WorkItem::with_id(id, item.text, item.guideline_version),
            None => WorkItem::new(item.text, item.guideline_version),
        })
        .collect();

    let order: HashMap<Uuid, usize> = items
        .iter()
        .enumerate()
        .map(|(position, item)| (item.id, position))
        .collect();
    if order.len() != items.len() {
        return Err(AppError::Validation("item ids must be unique".to_string()));
    }

    let mut results = state.batch.run(items, state.shutdown.clone()).await;
    results.sort_by_key(|r| order.get(&r.work_item_id()).copied().unwrap_or(usize::MAX));

    Ok(Json(BatchResponse {
        results: results.into_iter().map(BatchItemResponse::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::batch::BatchScheduler;
    use crate::cache::{MemoryStore, ResultCache};
    use crate::config::PipelineConfig;
    use crate::enrichment::{DisabledProvider, EnrichmentClient};
    use crate::llm_client::test_support::{client, reply, FnBackend};
    use crate::llm_client::ModelError;
    use crate::pipeline::{CancelToken, Pipeline, PipelineDeps};
    use crate::retry::RetryPolicy;
    use crate::routes::build_router;
    use crate::validator::GuidelineRegistry;

    const SUMMARY: &str = r#"{
        "title": "Site Reliability Engineer",
        "location_type": "Onsite",
        "overview": "The Site Reliability Engineer keeps the trading platform available and fast, owning incident response and capacity planning.",
        "responsibilities": ["Own incident response"],
        "requirements": ["On-call experience"]
    }"#;

    fn app() -> Router {
        let backend = Arc::new(FnBackend::new(|prompt| match prompt.template {
            "critic" => reply(r#"{"pass": true, "rationale": "Fine"}"#),
            _ if prompt.user.contains("REJECT") => Err(ModelError::Rejected {
                status: 400,
                message: "content policy".to_string(),
            }),
            _ => reply(SUMMARY),
        }));
        let config = PipelineConfig::default();
        let enrichment = EnrichmentClient::new(
            Arc::new(DisabledProvider),
            Arc::new(MemoryStore::new()),
            RetryPolicy::new(1, Duration::from_millis(10)),
            Duration::from_secs(1),
            config.enrich_ttl,
        );
        let deps = PipelineDeps {
            model: Arc::new(client(backend, 1)),
            enrichment: Arc::new(enrichment),
            cache: ResultCache::new(Arc::new(MemoryStore::new())),
            guidelines: Arc::new(GuidelineRegistry::with_default()),
        };
        let pipeline = Arc::new(Pipeline::new(deps, config));
        build_router(AppState {
            batch: Arc::new(BatchScheduler::new(pipeline.clone(), 2)),
            pipeline,
            shutdown: CancelToken::never(),
        })
    }

    async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_summarize_returns_summary() {
        let (status, body) = post(
            app(),
            "/api/v1/summaries",
            json!({"text": "Site Reliability Engineer\n\nKeep the platform up."}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["title"], "Site Reliability Engineer");
        assert_eq!(body["cached"], false);
        assert!(body["posting_id"].as_str().unwrap().starts_with("job_"));
    }

    #[tokio::test]
    async fn test_summarize_unknown_guideline_is_structured_400() {
        let (status, body) = post(
            app(),
            "/api/v1/summaries",
            json!({"text": "SRE", "guideline_version": "nope"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_summarize_rejection_hides_upstream_detail() {
        let (status, body) = post(app(), "/api/v1/summaries", json!({"text": "REJECT me"})).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "NON_RETRYABLE_EXTERNAL_ERROR");
        assert!(!body["error"]["message"].as_str().unwrap().contains("content policy"));
    }

    #[tokio::test]
    async fn test_batch_reports_each_item_in_submission_order() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let (status, body) = post(
            app(),
            "/api/v1/summaries/batch",
            json!({"items": [
                {"id": ids[0], "text": "SRE one"},
                {"id": ids[1], "text": "REJECT two"},
                {"id": ids[2], "text": "SRE three"},
            ]}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        for (result, id) in results.iter().zip(&ids) {
            assert_eq!(result["work_item_id"], id.to_string());
        }
        assert_eq!(results[0]["status"], "succeeded");
        assert_eq!(results[1]["status"], "failed");
        assert_eq!(results[1]["error"]["code"], "NON_RETRYABLE_EXTERNAL_ERROR");
        assert!(results[1].get("summary").is_none());
    }

    #[test]
    fn test_crashed_item_is_internal_error_without_reason() {
        let work_item_id = Uuid::new_v4();
        let response = BatchItemResponse::from(BatchItemResult::Crashed {
            work_item_id,
            reason: "run panicked".to_string(),
        });

        assert_eq!(response.work_item_id, work_item_id);
        assert_eq!(response.status, "failed");
        let error = response.error.unwrap();
        assert_eq!(error.code, "INTERNAL_ERROR");
        assert!(!error.message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_batch_rejects_empty_and_duplicate_ids() {
        let (status, _) = post(app(), "/api/v1/summaries/batch", json!({"items": []})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let id = Uuid::new_v4();
        let (status, body) = post(
            app(),
            "/api/v1/summaries/batch",
            json!({"items": [{"id": id, "text": "a"}, {"id": id, "text": "b"}]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
