use crate::llm_client::prompts::PromptTemplate;
use crate::llm_client::ModelTier;

/// Drafting pass. `{feedback}` is empty on the first draft and carries the accumulated
/// validator feedback on revisions.
pub static DRAFT_TEMPLATE: PromptTemplate = PromptTemplate {
    name: "draft_summary",
    system: "You are a senior editor for a careers site. You turn raw job postings into \
        short, structured, brand-compliant summaries.",
    body: r#"Summarize the job posting below for the careers site.

BRAND VOICE:
{voice}

{grounding}

JOB POSTING:
{posting}

COMPANY CONTEXT (may be empty; use only if consistent with the posting):
{context}

{feedback}

Rules:
- "overview" is {overview_min} to {overview_max} characters.
- Each list has at most {max_items} short items.
- "location_type" is one of "Remote", "Hybrid", "Onsite", "Unknown".
- Omit "company" if the posting does not name it.

Return JSON with this exact structure:
{
  "title": "Job title as stated in the posting",
  "company": "Company name or null",
  "location_type": "Remote",
  "overview": "Two or three sentences describing the role",
  "responsibilities": ["..."],
  "requirements": ["..."],
  "tech_stack": ["..."]
}"#,
    required_vars: &[
        "voice",
        "grounding",
        "posting",
        "context",
        "feedback",
        "overview_min",
        "overview_max",
        "max_items",
    ],
    tier: ModelTier::Advanced,
    temperature: 0.3,
    max_tokens: 1500,
};

/// Heading placed before accumulated revision feedback.
pub const REVISION_HEADER: &str = "\
PREVIOUS DRAFTS WERE REJECTED. Fix every issue below in this draft:";

pub const NO_CONTEXT: &str = "(none)";
