use crate::llm_client::prompts::PromptTemplate;
use crate::llm_client::ModelTier;

/// Critic pass: judges tone and voice only. Structural rules are checked in code first.
pub static CRITIC_TEMPLATE: PromptTemplate = PromptTemplate {
    name: "critic",
    system: "You are a strict brand editor reviewing job summaries for a careers site. \
        You judge voice and tone only; structure has already been checked.",
    body: r#"Review this job summary against the brand voice guidelines.

BRAND VOICE:
{voice}

SUMMARY (JSON):
{draft_json}

Fail the summary if it contradicts the brand voice: hype, marketing fluff, addressing the
reader, exaggerated claims, or a tone the guidelines rule out. Minor wording preferences are
not failures.

Return JSON with this exact structure:
{
  "pass": true,
  "rationale": "One or two sentences explaining the decision",
  "issues": ["Specific, actionable problem", "..."]
}

"issues" must be empty when "pass" is true."#,
    required_vars: &["voice", "draft_json"],
    tier: ModelTier::Basic,
    temperature: 0.0,
    max_tokens: 800,
};
