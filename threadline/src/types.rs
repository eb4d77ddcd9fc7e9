//! Common type definitions.
//!
//! All identifiers handed out by the assistant API are opaque strings (`thread_abc123`,
//! `msg_abc123`, ...). They are wrapped in type aliases so signatures say which one they expect.
//!
//! - [`ThreadId`]: conversation context, created on the first request and reused afterwards
//! - [`MessageId`]: a message inside a thread
//! - [`RunId`]: one execution of the assistant against a thread
//! - [`FileId`]: an uploaded file
//! - [`VectorStoreId`]: the file index used by `file_search`
//! - [`AssistantId`]: the configured assistant

use serde::{Deserialize, Serialize};
use std::fmt;

// Type aliases for IDs
pub type ThreadId = String;
pub type MessageId = String;
pub type RunId = String;
pub type FileId = String;
pub type VectorStoreId = String;
pub type FileBatchId = String;
pub type AssistantId = String;

/// How an uploaded file is made available to the assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Ingest the file into the shared vector store and point the assistant at it
    #[default]
    VectorStore,
    /// Upload the file and attach it to the user message by file id
    Attachment,
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStrategy::VectorStore => write!(f, "vector_store"),
            UploadStrategy::Attachment => write!(f, "attachment"),
        }
    }
}
