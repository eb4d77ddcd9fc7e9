//! The message envelope exchanged between the chat page and the assistant route.
//!
//! The browser posts the assistant-hook body [`ChatRequest`], whose `message` field is not the
//! user's text but a *stringified* envelope:
//!
//! ```json
//! {"threadId": null, "message": "{\"message\":\"hi\",\"threadId\":\"\",\"isAppended\":\"false\"}"}
//! ```
//!
//! When a file is attached, `isAppended` is `"true"` and the envelope carries a `file` field that
//! is itself stringified JSON holding the file name, size, MIME type and base64 content.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{Error, Result};
use crate::types::ThreadId;

/// Outer request body posted to `/api/assistant`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Thread the client believes it is on. The envelope's own `threadId` wins when set.
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    /// Stringified [`MessageEnvelope`]
    pub message: String,
    /// Extra data the client hook may attach; ignored by the route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<serde_json::Value>,
}

/// A file selected in the chat form, with its bytes base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileUpload {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    /// Base64 without the `data:...;base64,` prefix
    pub content: String,
}

impl FileUpload {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            mime_type: mime_type.into(),
            content: STANDARD.encode(bytes),
        }
    }

    /// Decode the base64 content into the raw file bytes.
    pub fn decode(&self) -> Result<Bytes> {
        Ok(Bytes::from(STANDARD.decode(self.content.trim())?))
    }
}

/// The wire form of the envelope, every value a string as produced by a form submission.
///
/// `message` and `threadId` accept numbers and booleans as their text; objects and arrays are
/// rejected. `isAppended` is kept as sent since only the string `"true"` counts.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default, deserialize_with = "scalar_as_string")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    thread_id: Option<String>,
    #[serde(default)]
    is_appended: Option<serde_json::Value>,
}

fn scalar_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(D::Error::custom(format!("expected a string, found {other}"))),
    }
}

/// Decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub message: String,
    pub thread_id: Option<ThreadId>,
    pub is_appended: bool,
    pub file: Option<FileUpload>,
}

impl MessageEnvelope {
    pub fn new(message: impl Into<String>, thread_id: Option<ThreadId>) -> Self {
        Self {
            message: message.into(),
            thread_id,
            is_appended: false,
            file: None,
        }
    }

    pub fn with_file(mut self, file: FileUpload) -> Self {
        self.is_appended = true;
        self.file = Some(file);
        self
    }

    /// Decode a stringified envelope.
    ///
    /// `file` is only read when `isAppended` is exactly `"true"`; an empty `file` string counts
    /// as no file.
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: RawEnvelope = serde_json::from_str(raw)?;
        let is_appended = envelope.is_appended.as_ref().and_then(|v| v.as_str()) == Some("true");

        let file = match (is_appended, envelope.file.as_deref()) {
            (true, Some(file)) if !file.is_empty() => Some(serde_json::from_str::<FileUpload>(file)?),
            _ => None,
        };

        Ok(Self {
            message: envelope.message.unwrap_or_default(),
            thread_id: envelope.thread_id.filter(|id| !id.is_empty()),
            is_appended,
            file,
        })
    }

    /// Thread to continue, if any. Empty identifiers count as absent.
    pub fn effective_thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Serialize into the stringified form a browser form would produce.
    pub fn to_wire(&self) -> Result<String> {
        let file = match &self.file {
            Some(file) if self.is_appended => Some(serde_json::to_string(file)?),
            _ => None,
        };
        let raw = RawEnvelope {
            message: Some(self.message.clone()),
            file,
            thread_id: Some(self.thread_id.clone().unwrap_or_default()),
            is_appended: Some(if self.is_appended { "true" } else { "false" }.into()),
        };
        Ok(serde_json::to_string(&raw)?)
    }

    /// Wrap into the outer request body.
    pub fn to_request(&self) -> Result<ChatRequest> {
        Ok(ChatRequest {
            thread_id: self.thread_id.clone(),
            message: self.to_wire()?,
            data: None,
        })
    }
}

impl ChatRequest {
    /// Decode the nested envelope, falling back to the outer `threadId` when the envelope has none.
    pub fn envelope(&self) -> Result<MessageEnvelope> {
        let mut envelope = MessageEnvelope::parse(&self.message)?;
        if envelope.thread_id.is_none() {
            envelope.thread_id = self.thread_id.clone().filter(|id| !id.is_empty());
        }
        Ok(envelope)
    }
}
