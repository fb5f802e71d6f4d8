use std::time::Duration;

use thiserror::Error;

use crate::llm_client::ModelError;
use crate::validator::RuleViolation;

/// Why a run ended in `Failed`. Validation failures and cache outages never appear here:
/// the first drives the revision loop, the second degrades to a cache miss.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{boundary} unavailable after retries: {message}")]
    TransientExternal { boundary: &'static str, message: String },

    #[error("{boundary} rejected the request: {message}")]
    NonRetryableExternal { boundary: &'static str, message: String },

    #[error("max revisions exceeded after {drafts} drafts")]
    RevisionLimitExceeded {
        drafts: u32,
        violations: Vec<RuleViolation>,
    },

    #[error("run exceeded its {0:?} budget")]
    RunTimeout(Duration),

    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Stable machine-readable reason code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "INVALID_INPUT",
            PipelineError::TransientExternal { .. } => "TRANSIENT_EXTERNAL_ERROR",
            PipelineError::NonRetryableExternal { .. } => "NON_RETRYABLE_EXTERNAL_ERROR",
            PipelineError::RevisionLimitExceeded { .. } => "REVISION_LIMIT_EXCEEDED",
            PipelineError::RunTimeout(_) => "RUN_TIMEOUT",
            PipelineError::Cancelled => "CANCELLED",
        }
    }

    /// Caller-facing message. External error text stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::InvalidInput(msg) => msg.clone(),
            PipelineError::TransientExternal { boundary, .. } => {
                format!("The {boundary} service is temporarily unavailable; try again later")
            }
            PipelineError::NonRetryableExternal { boundary, .. } => {
                format!("The {boundary} service rejected the request")
            }
            other => other.to_string(),
        }
    }
}

impl From<ModelError> for PipelineError {
    fn from(e: ModelError) -> Self {
        if e.is_transient() {
            PipelineError::TransientExternal {
                boundary: "model",
                message: e.to_string(),
            }
        } else {
            PipelineError::NonRetryableExternal {
                boundary: "model",
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_errors_map_to_taxonomy() {
        let transient: PipelineError = ModelError::Timeout(Duration::from_secs(20)).into();
        assert_eq!(transient.code(), "TRANSIENT_EXTERNAL_ERROR");

        let rejected: PipelineError = ModelError::Rejected {
            status: 400,
            message: "content policy".to_string(),
        }
        .into();
        assert_eq!(rejected.code(), "NON_RETRYABLE_EXTERNAL_ERROR");
    }

    #[test]
    fn test_public_message_hides_external_detail() {
        let err = PipelineError::NonRetryableExternal {
            boundary: "model",
            message: "invalid x-api-key sk-ant-123".to_string(),
        };
        assert!(!err.public_message().contains("sk-ant"));
    }

    #[test]
    fn test_revision_limit_message() {
        let err = PipelineError::RevisionLimitExceeded {
            drafts: 3,
            violations: vec![],
        };
        assert_eq!(err.to_string(), "max revisions exceeded after 3 drafts");
    }
}
