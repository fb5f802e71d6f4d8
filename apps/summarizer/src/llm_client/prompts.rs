// Shared prompt types and cross-cutting prompt fragments.
// Each module that calls the model defines its own templates in a prompts.rs alongside it.

use crate::llm_client::ModelTier;

/// A named prompt template. `{name}` placeholders in `body` are filled from `PromptSpec`
/// variables; every name in `required_vars` must be bound before the call is made.
#[derive(Debug)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub system: &'static str,
    pub body: &'static str,
    pub required_vars: &'static [&'static str],
    pub tier: ModelTier,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to prompts whose output must stay grounded in the supplied posting.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every statement must be supported by the job posting or the supplied \
    company context. Do NOT invent salary, benefits, team size, or requirements. \
    If the posting does not state something, omit it.";
