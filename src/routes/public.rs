use crate::AppState;
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without a session. Their paths must be part of the configured
/// public route set; anything else is treated as a protected page by the gateway.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers. Returns "ok" immediately.
        .route("/health", get(|| async { "ok" }))
}
