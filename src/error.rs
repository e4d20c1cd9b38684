use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// GatewayError
///
/// The complete failure taxonomy of the gateway. Every branch of the dispatcher and the
/// query composer either proceeds or terminates the request with exactly one of these.
///
/// `Unauthenticated` and `Forbidden` map to distinct statuses so a caller can
/// tell "log in" apart from "not yours".
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No identity where one is required (401).
    #[error("Unauthorized")]
    Unauthenticated,

    /// Identity present but the ownership check failed (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing fields, unknown action or table, unsupported filter operator (400).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A collaborator (table store, generator) failed. Detail is passed through (500).
    #[error("{0}")]
    ExternalFailure(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ExternalFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// StoreError
///
/// Failure reported by the external table store. The gateway never interprets the
/// detail beyond surfacing it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Rejected(String),

    /// Raised by startup verification when the registry names something the store lacks.
    #[error("store schema mismatch: {0}")]
    Schema(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        tracing::error!("table store failure: {}", err);
        GatewayError::ExternalFailure(err.to_string())
    }
}
