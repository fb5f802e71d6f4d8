//! The generation pipeline: a state machine over `RunState` that sequences fingerprinting,
//! caching, enrichment, drafting and validation into one run.

pub mod cancel;
pub mod errors;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod state;

pub use cancel::{cancel_pair, CancelToken};
pub use errors::PipelineError;
pub use orchestrator::{Pipeline, PipelineDeps, RunOutcome};
