use crate::{
    classifier::Posture,
    composer::{ActionDescriptor, ComposerState},
    config::AppConfig,
    error::GatewayError,
    gateway::GatewayState,
    generator::GeneratorState,
    models::{DataRequest, DataResponse, ErrorResponse, GenerateBlueprintRequest, Identity},
};
use axum::{
    Json,
    extract::{Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use std::path::Path;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

// --- Handlers ---

/// handle_data
///
/// [Protected API] The generic data endpoint. Parses the body into an `ActionDescriptor`
/// and hands it to the `QueryComposer` together with the caller's identity.
///
/// *Note*: The identity is never read from the body; it comes from the session the gateway
/// middleware resolved.
#[utoipa::path(
    post,
    path = "/api/data",
    request_body = DataRequest,
    responses(
        (status = 200, description = "Action executed", body = DataResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn handle_data(
    identity: Identity,
    State(composer): State<ComposerState>,
    payload: Result<Json<DataRequest>, JsonRejection>,
) -> Result<Json<DataResponse>, GatewayError> {
    let Json(request) = payload.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    tracing::debug!(action = %request.action, table = %request.table, "data request");

    let action = ActionDescriptor::try_from(request)?;
    let data = composer.execute(&identity, action).await?;
    Ok(Json(DataResponse::ok(data)))
}

/// get_me
///
/// [Protected API] Returns the identity resolved for the current session.
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current identity", body = Identity),
        (status = 401, description = "No session", body = ErrorResponse)
    )
)]
pub async fn get_me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

/// generate_blueprint
///
/// [Protected API] Passes the idea and audience to the generation collaborator and returns
/// its document. Nothing is stored; the client saves a blueprint through `/api/data`.
#[utoipa::path(
    post,
    path = "/api/generate",
    request_body = GenerateBlueprintRequest,
    responses(
        (status = 200, description = "Generated blueprint", body = DataResponse),
        (status = 400, description = "Missing idea or audience", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 500, description = "Generation failed", body = ErrorResponse)
    )
)]
pub async fn generate_blueprint(
    identity: Identity,
    State(generator): State<GeneratorState>,
    payload: Result<Json<GenerateBlueprintRequest>, JsonRejection>,
) -> Result<Json<DataResponse>, GatewayError> {
    let Json(request) = payload.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let (idea, audience) = (request.idea.trim(), request.audience.trim());
    if idea.is_empty() || audience.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "`idea` and `audience` are required".to_string(),
        ));
    }

    tracing::info!(user = %identity.id, "generating blueprint");
    let blueprint = generator.generate(idea, audience).await?;
    let data = serde_json::to_value(blueprint)
        .map_err(|e| GatewayError::ExternalFailure(e.to_string()))?;
    Ok(Json(DataResponse::ok(data)))
}

/// fallback
///
/// Requests no route matched. Under a protected-API prefix the caller gets a JSON 404;
/// everything else is a page, served from `STATIC_DIR` (SPA fallback to `index.html`) or
/// as the bare HTML shell.
pub async fn fallback(
    State(gateway): State<GatewayState>,
    State(config): State<AppConfig>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();
    if gateway.posture(&path) == Posture::ProtectedApi {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No API route for {}", path) })),
        )
            .into_response();
    }

    match &config.static_dir {
        Some(dir) => {
            let index = Path::new(dir).join("index.html");
            match ServeDir::new(dir)
                .fallback(ServeFile::new(index))
                .oneshot(request)
                .await
            {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            }
        }
        None => page_shell(&path).into_response(),
    }
}

/// page_shell
///
/// [Page] Minimal HTML document served for pages that passed the gateway when no built
/// front-end (`STATIC_DIR`) is configured.
fn page_shell(path: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Idea Gateway</title></head>\
         <body><div id=\"root\" data-path=\"{}\"></div></body></html>",
        escape_attr(path)
    ))
}

fn escape_attr(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
