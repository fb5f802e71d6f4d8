//! Two-tier validation of a draft summary against a guideline spec.
//!
//! Tier one is deterministic (`rules::check_structure`) and free. Tier two asks the critic
//! model for a tone/voice judgement and only runs when tier one passes, so a draft with
//! structural problems never costs a model call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm_client::{ModelClient, ModelError, OutputSchema, PromptSpec};
use crate::models::JobSummary;

pub mod guidelines;
pub mod prompts;
pub mod rules;

pub use guidelines::{GuidelineRegistry, GuidelineSpec, DEFAULT_GUIDELINE_VERSION};

use prompts::CRITIC_TEMPLATE;

pub const RULE_CRITIC_VOICE: &str = "critic_voice";
pub const RULE_CRITIC_OUTPUT: &str = "critic_output";
pub const RULE_STRUCTURED_OUTPUT: &str = "structured_output";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub reason: String,
}

impl RuleViolation {
    pub fn new(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of validating one draft. `passed` is true iff `violations` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub passed: bool,
    pub violations: Vec<RuleViolation>,
}

impl ValidationVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    pub fn from_violations(violations: Vec<RuleViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    pub fn single(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::from_violations(vec![RuleViolation::new(rule_id, reason)])
    }

    /// Revision feedback for the drafter, one bullet per violation.
    pub fn feedback(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("- [{}] {}", v.rule_id, v.reason))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct CriticResponse {
    pass: bool,
    rationale: String,
    #[serde(default)]
    issues: Vec<String>,
}

pub struct Validator {
    model: Arc<ModelClient>,
}

impl Validator {
    pub fn new(model: Arc<ModelClient>) -> Self {
        Self { model }
    }

    /// Validates `draft` against `guideline`.
    ///
    /// A malformed critic response is a failed verdict, not an error: the draft goes back
    /// for revision. Transport and rejection errors from the critic call are returned.
    pub async fn validate(
        &self,
        draft: &JobSummary,
        guideline: &GuidelineSpec,
    ) -> Result<ValidationVerdict, ModelError> {
        let structural = rules::check_structure(draft, guideline);
        if !structural.passed {
            debug!(
                violations = structural.violations.len(),
                "Draft failed structural checks; skipping critic"
            );
            return Ok(structural);
        }

        // Serializing a plain struct of strings cannot fail.
        let draft_json = serde_json::to_string_pretty(draft).unwrap_or_default();
        let spec = PromptSpec::new(&CRITIC_TEMPLATE)
            .var("voice", guideline.voice.as_str())
            .var("draft_json", draft_json)
            .with_schema(OutputSchema::CriticVerdict);

        let response = match self.model.complete_json::<CriticResponse>(&spec).await {
            Ok((response, _)) => response,
            Err(ModelError::MalformedOutput { detail, .. }) => {
                return Ok(ValidationVerdict::single(
                    RULE_CRITIC_OUTPUT,
                    format!("Critic response could not be parsed: {detail}"),
                ));
            }
            Err(e) => return Err(e),
        };

        if response.pass {
            info!("Draft passed critic review");
            return Ok(ValidationVerdict::pass());
        }

        let violations = if response.issues.is_empty() {
            vec![RuleViolation::new(RULE_CRITIC_VOICE, response.rationale)]
        } else {
            response
                .issues
                .into_iter()
                .map(|issue| RuleViolation::new(RULE_CRITIC_VOICE, issue))
                .collect()
        };
        info!(issues = violations.len(), "Draft failed critic review");
        Ok(ValidationVerdict::from_violations(violations))
    }
}
