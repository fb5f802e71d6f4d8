//! Pipeline orchestrator — drives one `RunState` through the node graph in `state.rs`.
//!
//! Every node is a method returning the next node or a `PipelineError`; the run loop owns
//! the cross-cutting checks (cancellation and the wall-clock budget) that sit between
//! transitions. External calls happen only in `Start`/`Finalize` (cache), `Enrich`,
//! `Draft` and `Validate`.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheEntry, PutOutcome, ResultCache};
use crate::config::PipelineConfig;
use crate::enrichment::{build_query, EnrichmentClient, EnrichmentResult};
use crate::fingerprint::{fingerprint, preserve_paragraphs, Fingerprint};
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{ModelClient, ModelError, OutputSchema, PromptSpec};
use crate::models::{JobSummary, WorkItem};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::errors::PipelineError;
use crate::pipeline::prompts::{DRAFT_TEMPLATE, NO_CONTEXT, REVISION_HEADER};
use crate::pipeline::state::{verdict_edge, Node, RunState, RunStatus, VerdictEdge};
use crate::validator::{
    GuidelineRegistry, GuidelineSpec, ValidationVerdict, Validator, RULE_STRUCTURED_OUTPUT,
};

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Process-wide collaborators. Initialized once in `main`; no run owns them.
pub struct PipelineDeps {
    pub model: Arc<ModelClient>,
    pub enrichment: Arc<EnrichmentClient>,
    pub cache: ResultCache,
    pub guidelines: Arc<GuidelineRegistry>,
}

/// What a caller gets back from one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub work_item_id: Uuid,
    pub fingerprint: Fingerprint,
    pub result: Result<JobSummary, PipelineError>,
    /// True when the output came straight from the result cache.
    pub cached: bool,
    pub drafts: u32,
    pub history: Vec<Node>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Pipeline {
    model: Arc<ModelClient>,
    validator: Validator,
    enrichment: Arc<EnrichmentClient>,
    cache: ResultCache,
    guidelines: Arc<GuidelineRegistry>,
    config: PipelineConfig,
}

// ────────────────────────────────────────────────────────────────────────────
// Run loop
// ────────────────────────────────────────────────────────────────────────────

impl Pipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self {
            validator: Validator::new(deps.model.clone()),
            model: deps.model,
            enrichment: deps.enrichment,
            cache: deps.cache,
            guidelines: deps.guidelines,
            config,
        }
    }

    #[cfg(test)]
    pub async fn run(&self, item: &WorkItem) -> RunOutcome {
        self.run_with_cancel(item, CancelToken::never()).await
    }

    /// Runs `item` to a terminal node.
    ///
    /// Cancellation and the run budget are checked before every non-terminal node, so a
    /// result that arrives from an in-flight call after either trips is discarded. Once
    /// `Finalize` has written the cache the run is `Done` and nothing can undo it.
    pub async fn run_with_cancel(&self, item: &WorkItem, cancel: CancelToken) -> RunOutcome {
        let fingerprint = fingerprint(
            &item.source_text,
            &item.guideline_version,
            &self.config.pipeline_version,
        );
        let mut state = RunState::new(item.id, fingerprint);
        let started = Instant::now();

        info!(
            work_item_id = %item.id,
            fingerprint = %state.fingerprint,
            guideline = %item.guideline_version,
            "Pipeline run started"
        );

        while !state.node.is_terminal() {
            if cancel.is_cancelled() {
                warn!(work_item_id = %item.id, node = ?state.node, "Run cancelled");
                state.fail(PipelineError::Cancelled);
                break;
            }
            if started.elapsed() >= self.config.run_budget {
                warn!(work_item_id = %item.id, node = ?state.node, "Run budget exhausted");
                state.fail(PipelineError::RunTimeout(self.config.run_budget));
                break;
            }

            let from = state.node;
            state.enter();
            match self.step(item, &mut state).await {
                Ok(next) => {
                    debug!(work_item_id = %item.id, ?from, to = ?next, "Node transition");
                    state.advance(next);
                }
                Err(e) => {
                    warn!(work_item_id = %item.id, node = ?from, code = e.code(), "Run failed: {e}");
                    state.fail(e);
                }
            }
        }

        let elapsed = started.elapsed();
        if state.status == RunStatus::Succeeded {
            info!(
                work_item_id = %item.id,
                drafts = state.drafts,
                cached = state.cached,
                "Pipeline run succeeded in {}ms",
                elapsed.as_millis()
            );
        }

        let result = match state.error {
            Some(e) => Err(e),
            None => state.draft.ok_or_else(missing_draft),
        };

        RunOutcome {
            work_item_id: state.work_item_id,
            fingerprint: state.fingerprint,
            result,
            cached: state.cached,
            drafts: state.drafts,
            history: state.history,
        }
    }

    async fn step(&self, item: &WorkItem, state: &mut RunState) -> Result<Node, PipelineError> {
        match state.node {
            Node::Start => self.start(item, state).await,
            Node::Normalize => normalize(item, state),
            Node::Enrich => self.enrich(state).await,
            Node::Draft => self.draft(state).await,
            Node::Validate => self.validate(state).await,
            Node::Revise => Ok(revise(state)),
            Node::Finalize => self.finalize(state).await,
            Node::Done | Node::Failed => Ok(state.node),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Nodes
    // ────────────────────────────────────────────────────────────────────────

    async fn start(&self, item: &WorkItem, state: &mut RunState) -> Result<Node, PipelineError> {
        let guideline = self.guidelines.get(&item.guideline_version).ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "unknown guideline version '{}'",
                item.guideline_version
            ))
        })?;
        state.guideline = Some(guideline);

        match self.cache.get(&state.fingerprint).await {
            Some(entry) => {
                info!(fingerprint = %state.fingerprint, "Result cache hit");
                state.cached = true;
                state.draft = Some(entry.output);
                state.verdict = Some(entry.verdict);
                Ok(Node::Done)
            }
            None => Ok(Node::Normalize),
        }
    }

    async fn enrich(&self, state: &mut RunState) -> Result<Node, PipelineError> {
        let query = build_query(&state.normalized_text);
        let result = self.enrichment.enrich(&query).await;
        if !result.is_available() {
            info!(fingerprint = %state.fingerprint, "Drafting without enrichment context");
        }
        state.enrichment = Some(result);
        Ok(Node::Draft)
    }

    async fn draft(&self, state: &mut RunState) -> Result<Node, PipelineError> {
        let guideline = current_guideline(state)?;
        state.drafts += 1;

        let spec = PromptSpec::new(&DRAFT_TEMPLATE)
            .var("voice", guideline.voice.as_str())
            .var("grounding", GROUNDING_INSTRUCTION)
            .var("posting", state.normalized_text.as_str())
            .var("context", context_block(state.enrichment.as_ref()))
            .var("feedback", state.feedback_block(REVISION_HEADER))
            .var("overview_min", guideline.overview_min_chars.to_string())
            .var("overview_max", guideline.overview_max_chars.to_string())
            .var("max_items", guideline.max_list_items.to_string())
            .with_schema(OutputSchema::JobSummary);

        match self.model.complete_json::<JobSummary>(&spec).await {
            Ok((summary, output)) => {
                debug!(
                    draft = state.drafts,
                    attempts = output.attempts,
                    model = %output.model,
                    output_tokens = output.usage.output_tokens,
                    latency_ms = output.latency.as_millis() as u64,
                    "Draft produced"
                );
                state.draft = Some(summary);
                state.verdict = None;
            }
            // A draft that does not parse is a failed validation for this attempt.
            Err(ModelError::MalformedOutput { detail, .. }) => {
                warn!(draft = state.drafts, "Draft did not match the summary schema: {detail}");
                state.draft = None;
                state.verdict = Some(ValidationVerdict::single(
                    RULE_STRUCTURED_OUTPUT,
                    format!("Output did not match the required JSON structure: {detail}"),
                ));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Node::Validate)
    }

    async fn validate(&self, state: &mut RunState) -> Result<Node, PipelineError> {
        let guideline = current_guideline(state)?;

        let verdict = match state.draft.as_ref() {
            Some(draft) => self.validator.validate(draft, &guideline).await?,
            None => state.verdict.take().unwrap_or_else(|| {
                ValidationVerdict::single(RULE_STRUCTURED_OUTPUT, "No draft was produced")
            }),
        };

        match verdict_edge(verdict.passed, state.revisions, self.config.max_revisions) {
            VerdictEdge::Finalize => {
                state.verdict = Some(verdict);
                Ok(Node::Finalize)
            }
            VerdictEdge::Revise => {
                state.revisions += 1;
                info!(
                    revision = state.revisions,
                    violations = verdict.violations.len(),
                    "Draft rejected, revising"
                );
                state.verdict = Some(verdict);
                Ok(Node::Revise)
            }
            VerdictEdge::Exhausted => Err(PipelineError::RevisionLimitExceeded {
                drafts: state.drafts,
                violations: verdict.violations,
            }),
        }
    }

    async fn finalize(&self, state: &mut RunState) -> Result<Node, PipelineError> {
        let output = state.draft.clone().ok_or_else(missing_draft)?;
        let verdict = state.verdict.clone().unwrap_or_else(ValidationVerdict::pass);
        let ttl = self.config.result_ttl;
        let entry = CacheEntry {
            output,
            verdict,
            created_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };

        match self.cache.put(&state.fingerprint, &entry, ttl).await {
            PutOutcome::Written => {
                info!(fingerprint = %state.fingerprint, "Result cached");
            }
            PutOutcome::AlreadyPresent => {
                // A concurrent run for the same fingerprint finalized first; its entry wins.
                if let Some(winner) = self.cache.get(&state.fingerprint).await {
                    info!(fingerprint = %state.fingerprint, "Adopting concurrently cached result");
                    state.draft = Some(winner.output);
                    state.verdict = Some(winner.verdict);
                }
            }
            PutOutcome::Unavailable => {
                warn!(fingerprint = %state.fingerprint, "Result cache unavailable, result not cached");
            }
        }
        Ok(Node::Done)
    }
}

fn normalize(item: &WorkItem, state: &mut RunState) -> Result<Node, PipelineError> {
    let normalized = preserve_paragraphs(&item.source_text);
    if normalized.is_empty() {
        return Err(PipelineError::InvalidInput("job posting text is empty".to_string()));
    }
    state.normalized_text = normalized;
    Ok(Node::Enrich)
}

/// Folds the latest verdict into the feedback accumulator. No external calls.
fn revise(state: &mut RunState) -> Node {
    if let Some(verdict) = &state.verdict {
        state.feedback.push(verdict.feedback());
    }
    Node::Draft
}

fn current_guideline(state: &RunState) -> Result<Arc<GuidelineSpec>, PipelineError> {
    state
        .guideline
        .clone()
        .ok_or_else(|| PipelineError::InvalidInput("no guideline resolved for run".to_string()))
}

fn context_block(enrichment: Option<&EnrichmentResult>) -> String {
    match enrichment {
        Some(result) if result.is_available() => result
            .snippets
            .iter()
            .map(|s| format!("- {}: {} (source: {})", s.title, s.content, s.source_url))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => NO_CONTEXT.to_string(),
    }
}

fn missing_draft() -> PipelineError {
    PipelineError::NonRetryableExternal {
        boundary: "model",
        message: "no draft was produced".to_string(),
    }
}
