use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Largest state body accepted on POST/LOCK/UNLOCK.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // State (GET/POST/DELETE plus the LOCK/UNLOCK extension verbs)
        .route("/state/:project/:name", any(handlers::state_request))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
