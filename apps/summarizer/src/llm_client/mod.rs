/// Model Client — the single point of entry for all language-model calls.
///
/// ARCHITECTURAL RULE: No other module may call a model API directly.
/// All model interactions MUST go through `ModelClient::complete`.
///
/// The client owns the boundary policy: per-call timeout, bounded retries with
/// exponential backoff + jitter for transient failures, immediate surfacing of
/// non-transient ones, structured-output parsing, and usage telemetry.
/// The wire protocol lives behind `ModelBackend` (see `anthropic.rs`).
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

pub mod anthropic;
pub mod prompts;
pub mod usage;

use prompts::{PromptTemplate, JSON_ONLY_SYSTEM};
use usage::{UsageEvent, UsageRecorder};

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("transient model error: {message}")]
    Transient { status: Option<u16>, message: String },

    #[error("model request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model output does not match schema '{schema}': {detail}")]
    MalformedOutput { schema: &'static str, detail: String },

    #[error("model returned empty content")]
    EmptyContent,
}

impl ModelError {
    /// Timeouts, rate limits, 5xx and empty completions are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Transient { .. } | ModelError::Timeout(_) | ModelError::EmptyContent
        )
    }
}

/// Cost/quality tier. The backend maps tiers to concrete model names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Basic,
    Advanced,
}

/// Structured-output schemas the pipeline can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    JobSummary,
    CriticVerdict,
}

impl OutputSchema {
    pub fn name(&self) -> &'static str {
        match self {
            OutputSchema::JobSummary => "job_summary",
            OutputSchema::CriticVerdict => "critic_verdict",
        }
    }

    /// Top-level keys that must be present for the output to count as parsed.
    fn required_keys(&self) -> &'static [&'static str] {
        match self {
            OutputSchema::JobSummary => &["title", "overview", "responsibilities", "requirements"],
            OutputSchema::CriticVerdict => &["pass", "rationale"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub schema: Option<OutputSchema>,
}

/// Everything needed for one model invocation: which template, its variables, and
/// generation parameters (defaults come from the template).
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub template: &'static PromptTemplate,
    pub variables: BTreeMap<String, String>,
    pub params: GenerationParams,
}

impl PromptSpec {
    pub fn new(template: &'static PromptTemplate) -> Self {
        Self {
            template,
            variables: BTreeMap::new(),
            params: GenerationParams {
                temperature: template.temperature,
                max_tokens: template.max_tokens,
                schema: None,
            },
        }
    }

    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.params.schema = Some(schema);
        self
    }

    /// Fills the template. Fails without any network call if a required variable is unbound.
    pub fn render(&self) -> Result<RenderedPrompt, ModelError> {
        if let Some(missing) = self
            .template
            .required_vars
            .iter()
            .find(|name| !self.variables.contains_key(**name))
        {
            return Err(ModelError::InvalidPrompt(format!(
                "template '{}' is missing variable '{}'",
                self.template.name, missing
            )));
        }

        let system = match self.params.schema {
            Some(_) => format!("{}\n\n{}", self.template.system, JSON_ONLY_SYSTEM),
            None => self.template.system.to_string(),
        };

        Ok(RenderedPrompt {
            template: self.template.name,
            system,
            user: fill_template(self.template.body, &self.variables),
            tier: self.template.tier,
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        })
    }
}

/// A fully rendered prompt, ready for exactly one backend call.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub template: &'static str,
    pub system: String,
    pub user: String,
    pub tier: ModelTier,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Raw result of a single backend call.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub text: String,
    pub model: String,
    pub usage: Usage,
}

/// Transport for one model call. Implementations make exactly one network request and
/// classify failures into `ModelError`; they never retry.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn send(&self, prompt: &RenderedPrompt) -> Result<BackendResponse, ModelError>;
}

#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub text: String,
    /// Parsed JSON when the spec requested a schema.
    pub structured: Option<Value>,
    pub model: String,
    pub usage: Usage,
    pub attempts: u32,
    pub latency: Duration,
}

/// The single model client used by every pipeline component.
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ModelBackend>,
    retry: RetryPolicy,
    call_timeout: Duration,
    usage: UsageRecorder,
}

impl ModelClient {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        retry: RetryPolicy,
        call_timeout: Duration,
        usage: UsageRecorder,
    ) -> Self {
        Self {
            backend,
            retry,
            call_timeout,
            usage,
        }
    }

    /// Renders the prompt and calls the model, retrying transient failures only.
    ///
    /// Non-transient errors (rejected request, auth failure, content policy, bad prompt)
    /// return immediately. A schema mismatch is returned as `MalformedOutput` and is not
    /// retried here; the caller decides what a bad draft means.
    pub async fn complete(&self, spec: &PromptSpec) -> Result<ModelOutput, ModelError> {
        let prompt = spec.render()?;
        let mut last_error: Option<ModelError> = None;

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.delay_for(attempt - 1);
                warn!(
                    template = prompt.template,
                    "Model call attempt {} failed, retrying after {}ms...",
                    attempt - 1,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            let call = tokio::time::timeout(self.call_timeout, self.backend.send(&prompt));
            let result = match call.await {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout(self.call_timeout)),
            };

            let latency = started.elapsed();
            self.usage.record(UsageEvent {
                template: prompt.template,
                model: result.as_ref().ok().map(|r| r.model.clone()),
                input_tokens: result.as_ref().map_or(0, |r| r.usage.input_tokens),
                output_tokens: result.as_ref().map_or(0, |r| r.usage.output_tokens),
                latency,
                attempt,
                succeeded: result.is_ok(),
            });

            match result {
                Ok(response) => {
                    debug!(
                        template = prompt.template,
                        "Model call succeeded: input_tokens={}, output_tokens={}",
                        response.usage.input_tokens,
                        response.usage.output_tokens
                    );
                    return parse_output(spec.params.schema, response, attempt, latency);
                }
                Err(e) if e.is_transient() => {
                    warn!(template = prompt.template, attempt, "Transient model error: {e}");
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(template = prompt.template, "Non-retryable model error: {e}");
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or(ModelError::Transient {
            status: None,
            message: "no attempts were made".to_string(),
        }))
    }

    /// Calls the model and deserializes the structured output into `T`.
    /// The spec should request a schema; without one the raw text is parsed as JSON.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        spec: &PromptSpec,
    ) -> Result<(T, ModelOutput), ModelError> {
        let output = self.complete(spec).await?;
        let schema = spec.params.schema.map(|s| s.name()).unwrap_or("json");

        let value = match &output.structured {
            Some(value) => value.clone(),
            None => serde_json::from_str::<Value>(strip_json_fences(&output.text)).map_err(|e| {
                ModelError::MalformedOutput {
                    schema,
                    detail: e.to_string(),
                }
            })?,
        };

        let parsed = serde_json::from_value(value).map_err(|e| ModelError::MalformedOutput {
            schema,
            detail: e.to_string(),
        })?;
        Ok((parsed, output))
    }
}

fn parse_output(
    schema: Option<OutputSchema>,
    response: BackendResponse,
    attempts: u32,
    latency: Duration,
) -> Result<ModelOutput, ModelError> {
    let structured = match schema {
        None => None,
        Some(schema) => Some(parse_structured(schema, &response.text)?),
    };

    Ok(ModelOutput {
        text: response.text,
        structured,
        model: response.model,
        usage: response.usage,
        attempts,
        latency,
    })
}

fn parse_structured(schema: OutputSchema, text: &str) -> Result<Value, ModelError> {
    let malformed = |detail: String| ModelError::MalformedOutput {
        schema: schema.name(),
        detail,
    };

    let value: Value =
        serde_json::from_str(strip_json_fences(text)).map_err(|e| malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object".to_string()))?;

    if let Some(missing) = schema
        .required_keys()
        .iter()
        .find(|key| !object.contains_key(**key))
    {
        return Err(malformed(format!("missing field '{missing}'")));
    }

    Ok(value)
}

/// Single-pass `{name}` substitution. Values are never re-scanned, and braces that do not
/// enclose a bound identifier (e.g. JSON examples in the template) are left alone.
fn fill_template(body: &str, variables: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let bound = after
            .find('}')
            .and_then(|close| variables.get(&after[..close]).map(|v| (close, v)));

        match bound {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
