pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/summaries", post(handlers::handle_summarize))
        .route("/api/v1/summaries/batch", post(handlers::handle_batch))
        .with_state(state)
}
