use std::sync::Arc;

use crate::batch::BatchScheduler;
use crate::pipeline::{CancelToken, Pipeline};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Shares the pipeline above; bounded by `BATCH_CONCURRENCY`.
    pub batch: Arc<BatchScheduler>,
    /// Cancelled on shutdown so in-flight runs stop at their next node boundary.
    pub shutdown: CancelToken,
}
