use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single job posting submitted for summarization. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub source_text: String,
    pub guideline_version: String,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(source_text: impl Into<String>, guideline_version: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), source_text, guideline_version)
    }

    /// Used by callers that already own an identifier (e.g. batch requests that reorder by id).
    pub fn with_id(
        id: Uuid,
        source_text: impl Into<String>,
        guideline_version: impl Into<String>,
    ) -> Self {
        Self {
            id,
            source_text: source_text.into(),
            guideline_version: guideline_version.into(),
            created_at: Utc::now(),
        }
    }
}
