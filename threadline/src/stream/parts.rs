//! Line encoding of the streamed reply.
//!
//! Every part is one line, `<code>:<json>\n`, which the chat page reads incrementally:
//!
//! | code | part                   | payload                                              |
//! |------|------------------------|------------------------------------------------------|
//! | `0`  | text delta             | JSON string                                          |
//! | `3`  | error                  | JSON string                                          |
//! | `4`  | assistant message      | `{id, role, content: [{type: "text", text: {value}}]}` |
//! | `5`  | assistant control data | `{threadId, messageId}`                              |
//! | `6`  | data message           | `{id?, role: "data", data}`                          |

use serde_json::{Value, json};

use crate::errors::{Error, Result};
use crate::types::{MessageId, ThreadId};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    Text(String),
    Error(String),
    AssistantMessage { id: MessageId, text: String },
    AssistantControlData { thread_id: ThreadId, message_id: MessageId },
    DataMessage { id: Option<String>, data: Value },
}

impl StreamPart {
    pub fn code(&self) -> char {
        match self {
            StreamPart::Text(_) => '0',
            StreamPart::Error(_) => '3',
            StreamPart::AssistantMessage { .. } => '4',
            StreamPart::AssistantControlData { .. } => '5',
            StreamPart::DataMessage { .. } => '6',
        }
    }

    fn payload(&self) -> Value {
        match self {
            StreamPart::Text(text) | StreamPart::Error(text) => Value::String(text.clone()),
            StreamPart::AssistantMessage { id, text } => json!({
                "id": id,
                "role": "assistant",
                "content": [{ "type": "text", "text": { "value": text } }],
            }),
            StreamPart::AssistantControlData { thread_id, message_id } => json!({
                "threadId": thread_id,
                "messageId": message_id,
            }),
            StreamPart::DataMessage { id, data } => match id {
                Some(id) => json!({ "id": id, "role": "data", "data": data }),
                None => json!({ "role": "data", "data": data }),
            },
        }
    }

    /// Render as a newline-terminated line.
    pub fn encode(&self) -> String {
        format!("{}:{}\n", self.code(), self.payload())
    }

    /// Parse one line produced by [`StreamPart::encode`].
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (code, payload) = line
            .split_once(':')
            .ok_or_else(|| Error::Other(anyhow::anyhow!("Stream part without a code: {}", line)))?;
        let value: Value =
            serde_json::from_str(payload).map_err(|e| Error::Other(anyhow::anyhow!("Invalid stream part payload {:?}: {}", payload, e)))?;

        let text = |value: Value| match value {
            Value::String(s) => Ok(s),
            other => Err(Error::Other(anyhow::anyhow!("Expected a string payload, got {}", other))),
        };
        let field = |value: &Value, name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);

        match code {
            "0" => Ok(StreamPart::Text(text(value)?)),
            "3" => Ok(StreamPart::Error(text(value)?)),
            "4" => Ok(StreamPart::AssistantMessage {
                id: field(&value, "id").unwrap_or_default(),
                text: value
                    .pointer("/content/0/text/value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "5" => Ok(StreamPart::AssistantControlData {
                thread_id: field(&value, "threadId").unwrap_or_default(),
                message_id: field(&value, "messageId").unwrap_or_default(),
            }),
            "6" => Ok(StreamPart::DataMessage {
                id: field(&value, "id"),
                data: value.get("data").cloned().unwrap_or(Value::Null),
            }),
            other => Err(Error::Other(anyhow::anyhow!("Unknown stream part code {}", other))),
        }
    }
}
