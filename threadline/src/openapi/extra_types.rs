//! Schemas that only exist for documentation.
//!
//! Error bodies are built with `serde_json::json!` in [`crate::errors::Error::to_body`]; these
//! types describe their shape.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of a 400 response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"error": "Unsupported content type"}))]
pub struct ClientErrorResponse {
    pub error: String,
}

/// Body of a 500 response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServerErrorResponse {
    pub error: ServerError,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "type": "upstream_error",
    "message": "Assistant API error: 401 - Incorrect API key provided",
    "status": 401
}))]
pub struct ServerError {
    /// Machine-readable error kind, e.g. `malformed_envelope` or `not_configured`
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    /// Status returned by the assistant API, for `upstream_error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}
