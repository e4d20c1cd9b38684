use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Gateway components, leaves first.
pub mod classifier;
pub mod auth;
pub mod ownership;
pub mod composer;
pub mod gateway;

// Collaborators and supporting layers.
pub mod config;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod repository;

// Module for routing segregation (Public, Protected API).
pub mod routes;
use routes::{api, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry point (main.rs).
pub use config::AppConfig;
pub use composer::{ComposerState, QueryComposer};
pub use gateway::{Gateway, GatewayState};
pub use generator::GeneratorState;
pub use memory::InMemoryTableStore;
pub use repository::{PostgresTableStore, StoreState};

/// ApiDoc
///
/// Auto-generated OpenAPI document for the protected API, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::handle_data, handlers::get_me, handlers::generate_blueprint),
    components(
        schemas(
            models::DataRequest, models::DataResponse, models::ErrorResponse,
            models::RawFilter, models::Identity, models::GenerateBlueprintRequest,
            models::Blueprint,
        )
    ),
    tags(
        (name = "idea-gateway", description = "Authenticated data gateway for idea validation")
    )
)]
struct ApiDoc;

/// AppState
///
/// Single, immutable container for every collaborator, constructed once in `main` and
/// cloned (cheaply, through `Arc`s) into each request.
#[derive(Clone)]
pub struct AppState {
    /// Dispatcher: route classification + session verification.
    pub gateway: GatewayState,
    /// Query composer over the table store and ownership registry.
    pub composer: ComposerState,
    /// AI generation collaborator.
    pub generator: GeneratorState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Handlers and middleware pull only the component they need from the shared AppState.

impl FromRef<AppState> for GatewayState {
    fn from_ref(app_state: &AppState) -> GatewayState {
        app_state.gateway.clone()
    }
}

impl FromRef<AppState> for ComposerState {
    fn from_ref(app_state: &AppState) -> ComposerState {
        app_state.composer.clone()
    }
}

impl FromRef<AppState> for GeneratorState {
    fn from_ref(app_state: &AppState) -> GeneratorState {
        app_state.generator.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing structure and wraps all of it (fallback included) in the gateway
/// middleware, so no request reaches a handler without a posture decision.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let router = Router::new()
        // Documentation: public by default route configuration.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(api::api_routes());

    let base_router = router
        // Unmatched paths: JSON 404 under the API prefixes, pages everywhere else.
        .fallback(handlers::fallback)
        // 3. Gateway Dispatcher: classify, verify, enforce.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gateway::gateway_middleware,
        ))
        .with_state(state);

    // 4. Observability and Correlation Layers (outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: one span per request, carrying the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request tracing span from the method, URI and `x-request-id`.
/// Authorization headers and cookies never enter the span.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
