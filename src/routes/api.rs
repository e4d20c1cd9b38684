use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Protected API Router Module
///
/// Every path here sits under the protected-API prefix (`/api/*` by default). The gateway
/// answers 401 JSON (never a redirect) when no session resolves. Each handler also requires
/// the `Identity` extractor.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // POST /api/data
        // Generic insert/select/update/delete over registered tables, with ownership
        // constraints injected by the QueryComposer.
        .route("/api/data", post(handlers::handle_data))
        // GET /api/me
        // The identity resolved for the current session.
        .route("/api/me", get(handlers::get_me))
        // POST /api/generate
        // Blueprint generation through the AI collaborator.
        .route("/api/generate", post(handlers::generate_blueprint))
}
