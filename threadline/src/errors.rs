use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request body was not JSON
    #[error("Unsupported content type")]
    UnsupportedContentType,

    /// The request body or the envelope nested in it could not be decoded
    #[error("Malformed message envelope: {message}")]
    MalformedEnvelope { message: String },

    /// A setting required to serve the request is missing
    #[error("{setting} is not set")]
    NotConfigured { setting: &'static str },

    /// Uploaded file exceeds the configured size limit
    #[error("File size {size} exceeds maximum allowed size of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// The assistant API answered with a non-success status
    #[error("Assistant API error: {status} - {body}")]
    Upstream { status: u16, body: String },

    /// A file batch did not finish ingesting
    #[error("File batch {batch_id} ended with status {status}")]
    UploadIncomplete { batch_id: String, status: String },

    /// The run reported an error or ended as failed
    #[error("Assistant run error: {message}")]
    Run { message: String },

    /// The run asked for a tool nobody registered
    #[error("Unknown tool call function: {name}")]
    UnknownTool { name: String },

    /// Transport failure talking to the assistant API
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UnsupportedContentType => StatusCode::BAD_REQUEST,
            Error::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::MalformedEnvelope { .. }
            | Error::NotConfigured { .. }
            | Error::Upstream { .. }
            | Error::UploadIncomplete { .. }
            | Error::Run { .. }
            | Error::UnknownTool { .. }
            | Error::Http(_)
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable name for the error body
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedContentType => "unsupported_content_type",
            Error::MalformedEnvelope { .. } => "malformed_envelope",
            Error::NotConfigured { .. } => "not_configured",
            Error::FileTooLarge { .. } => "file_too_large",
            Error::Upstream { .. } => "upstream_error",
            Error::UploadIncomplete { .. } => "upload_incomplete",
            Error::Run { .. } => "run_error",
            Error::UnknownTool { .. } => "unknown_tool",
            Error::Http(_) => "upstream_unreachable",
            Error::Other(_) => "internal_error",
        }
    }

    /// JSON body sent to the client for this error
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            Error::UnsupportedContentType => json!({ "error": self.to_string() }),
            Error::Upstream { status, .. } => json!({
                "error": {
                    "type": self.kind(),
                    "message": self.to_string(),
                    "status": status,
                }
            }),
            _ => json!({
                "error": {
                    "type": self.kind(),
                    "message": format!("{:#}", self),
                }
            }),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Upstream { .. } | Error::Http(_) | Error::Other(_) | Error::UploadIncomplete { .. } | Error::Run { .. } => {
                tracing::error!("Error processing request: {:#}", self);
            }
            Error::NotConfigured { .. } | Error::UnknownTool { .. } => {
                tracing::error!("Configuration error: {}", self);
            }
            Error::MalformedEnvelope { .. } | Error::FileTooLarge { .. } => {
                tracing::warn!("Rejected request: {}", self);
            }
            Error::UnsupportedContentType => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), axum::response::Json(self.to_body())).into_response()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedEnvelope { message: err.to_string() }
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::MalformedEnvelope {
            message: format!("file content is not valid base64: {}", err),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
