//! Per-run state and the pure transition rules of the pipeline graph.
//!
//! ```text
//! Start ─hit─────────────────────────────────────────────▶ Done
//!   └─miss─▶ Normalize ─▶ Enrich ─▶ Draft ─▶ Validate ─pass─▶ Finalize ─▶ Done
//!                                    ▲          │fail
//!                                    └─ Revise ◀┘ (while revisions < max)
//! any node ─error / limit / budget / cancel─▶ Failed
//! ```

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::enrichment::EnrichmentResult;
use crate::fingerprint::Fingerprint;
use crate::models::JobSummary;
use crate::pipeline::errors::PipelineError;
use crate::validator::{GuidelineSpec, ValidationVerdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Start,
    Normalize,
    Enrich,
    Draft,
    Validate,
    Revise,
    Finalize,
    Done,
    Failed,
}

impl Node {
    pub fn is_terminal(self) -> bool {
        matches!(self, Node::Done | Node::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Where a failed verdict sends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictEdge {
    Finalize,
    Revise,
    Exhausted,
}

/// The conditional edge out of `Validate`. `revisions` counts revisions already taken,
/// so a draft that always fails is attempted exactly `max_revisions + 1` times.
pub fn verdict_edge(passed: bool, revisions: u32, max_revisions: u32) -> VerdictEdge {
    if passed {
        VerdictEdge::Finalize
    } else if revisions < max_revisions {
        VerdictEdge::Revise
    } else {
        VerdictEdge::Exhausted
    }
}

/// Mutable record of one pipeline invocation. Owned by that invocation only.
#[derive(Debug)]
pub struct RunState {
    pub work_item_id: Uuid,
    pub fingerprint: Fingerprint,
    pub node: Node,
    pub status: RunStatus,
    pub guideline: Option<Arc<GuidelineSpec>>,
    pub normalized_text: String,
    pub enrichment: Option<EnrichmentResult>,
    pub draft: Option<JobSummary>,
    pub verdict: Option<ValidationVerdict>,
    pub revisions: u32,
    pub drafts: u32,
    /// Corrective feedback from every failed round, oldest first. Folded into each
    /// subsequent draft prompt.
    pub feedback: Vec<String>,
    pub cached: bool,
    pub error: Option<PipelineError>,
    /// Nodes that actually executed, then the terminal node. A node the run moved to but
    /// never executed (because the budget or a cancel stopped it) is not recorded.
    pub history: Vec<Node>,
}

impl RunState {
    pub fn new(work_item_id: Uuid, fingerprint: Fingerprint) -> Self {
        Self {
            work_item_id,
            fingerprint,
            node: Node::Start,
            status: RunStatus::Pending,
            guideline: None,
            normalized_text: String::new(),
            enrichment: None,
            draft: None,
            verdict: None,
            revisions: 0,
            drafts: 0,
            feedback: Vec::new(),
            cached: false,
            error: None,
            history: Vec::new(),
        }
    }

    /// Marks the current node as executing.
    pub fn enter(&mut self) {
        self.history.push(self.node);
    }

    pub fn advance(&mut self, next: Node) {
        self.node = next;
        if next == Node::Done {
            self.status = RunStatus::Succeeded;
            self.history.push(Node::Done);
        }
    }

    pub fn fail(&mut self, error: PipelineError) {
        self.error = Some(error);
        self.status = RunStatus::Failed;
        self.node = Node::Failed;
        self.history.push(Node::Failed);
    }

    /// Feedback section for the next draft prompt; empty on the first draft.
    pub fn feedback_block(&self, header: &str) -> String {
        if self.feedback.is_empty() {
            return String::new();
        }
        let rounds = self
            .feedback
            .iter()
            .enumerate()
            .map(|(i, f)| format!("Round {}:\n{}", i + 1, f))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{header}\n{rounds}")
    }
}
