use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Identity ---

/// Identity
///
/// The stable user identifier resolved from a session by the external identity provider.
/// The dispatcher attaches it to the request extensions; downstream handlers read it back
/// through the `FromRequestParts` extractor in `auth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Identity {
    /// Opaque provider-issued user id (the value stored in owner columns).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}

// --- Generic Data Endpoint (Input Schemas) ---

/// DataRequest
///
/// Body of `POST /api/data`. The shape of `data` depends on `action`:
/// - insert: the record fields
/// - select: `{ select?: string, filters?: Filter[] }`
/// - update: `{ id, values }`
/// - delete: `{ id }`
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DataRequest {
    #[schema(example = "select")]
    pub action: String,
    #[schema(example = "ideas")]
    pub table: String,
    #[serde(default)]
    #[ts(type = "unknown")]
    #[schema(value_type = Object)]
    pub data: Value,
}

/// RawFilter
///
/// A caller-supplied filter before its operator has been validated.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RawFilter {
    pub column: String,
    #[serde(alias = "op")]
    #[schema(example = "eq")]
    pub operator: String,
    #[serde(default)]
    #[ts(type = "unknown")]
    #[schema(value_type = Object)]
    pub value: Value,
}

/// Select payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectData {
    pub select: Option<String>,
    pub filters: Option<Vec<RawFilter>>,
}

/// Update payload. Fields are optional here so a missing one becomes a 400, not a
/// deserialization panic in the handler.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateData {
    pub id: Option<Value>,
    pub values: Option<Value>,
}

/// Delete payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteData {
    pub id: Option<Value>,
}

// --- Responses (Output Schemas) ---

/// DataResponse
///
/// Success envelope shared by every protected API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DataResponse {
    pub success: bool,
    #[ts(type = "unknown")]
    #[schema(value_type = Object)]
    pub data: Value,
}

impl DataResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// ErrorResponse
///
/// Failure envelope produced by `GatewayError`. Only used for the OpenAPI document.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
}

// --- Blueprint Generation ---

/// GenerateBlueprintRequest
///
/// Input for `POST /api/generate`: the two strings handed to the generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GenerateBlueprintRequest {
    #[schema(example = "A marketplace for second-hand lab equipment")]
    pub idea: String,
    #[schema(example = "University research labs")]
    pub audience: String,
}

/// Blueprint
///
/// Structured validation document returned by the generator. Lists default to empty so a
/// partially filled document from the provider still deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Blueprint {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub problems: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub revenue_streams: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// is_identifier
///
/// Accepts plain SQL identifiers only (`[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes).
/// Every table and column name reaching the store passes through this check.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
