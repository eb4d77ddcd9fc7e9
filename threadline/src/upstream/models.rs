//! Request and response bodies of the assistant API.
//!
//! Only the fields the relay reads are modelled; everything else the service returns is ignored.

use serde::{Deserialize, Serialize};

use crate::types::{FileBatchId, FileId, MessageId, RunId, ThreadId, VectorStoreId};

/// Paginated list envelope (`{"object": "list", "data": [...], "has_more": ...}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStore {
    pub id: VectorStoreId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub id: FileId,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub in_progress: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub cancelled: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileBatch {
    pub id: FileBatchId,
    #[serde(default)]
    pub vector_store_id: Option<VectorStoreId>,
    /// `in_progress`, `completed`, `cancelled` or `failed`
    pub status: String,
    #[serde(default)]
    pub file_counts: FileCounts,
}

impl FileBatch {
    pub fn is_pending(&self) -> bool {
        self.status == "in_progress"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttachmentTool {
    FileSearch,
    CodeInterpreter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub file_id: FileId,
    pub tools: Vec<AttachmentTool>,
}

impl MessageAttachment {
    pub fn file_search(file_id: impl Into<FileId>) -> Self {
        Self {
            file_id: file_id.into(),
            tools: vec![AttachmentTool::FileSearch],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<MessageAttachment>,
}

impl CreateMessageRequest {
    pub fn user(content: impl Into<String>, attachments: Vec<MessageAttachment>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            attachments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: MessageId,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDelta {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaContent {
    #[serde(default)]
    pub index: u32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub content: Vec<MessageDeltaContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    pub id: MessageId,
    #[serde(default)]
    pub delta: MessageDeltaBody,
}

impl MessageDelta {
    /// Text of every text part in the delta, in order. Other part kinds are skipped.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.delta
            .content
            .iter()
            .filter(|content| content.kind == "text")
            .filter_map(|content| content.text.as_ref()?.value.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    pub status: String,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<LastError>,
}

impl Run {
    /// Tool calls the run is waiting on, when it is paused for `submit_tool_outputs`.
    pub fn pending_tool_calls(&self) -> Option<&[ToolCall]> {
        if self.status != "requires_action" {
            return None;
        }
        let action = self.required_action.as_ref()?;
        if action.kind != "submit_tool_outputs" {
            return None;
        }
        action.submit_tool_outputs.as_ref().map(|outputs| outputs.tool_calls.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRunRequest<'a> {
    pub assistant_id: &'a str,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitToolOutputsRequest<'a> {
    pub tool_outputs: &'a [ToolOutput],
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateFileBatchRequest<'a> {
    pub file_ids: &'a [FileId],
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateVectorStoreRequest<'a> {
    pub name: &'a str,
}
