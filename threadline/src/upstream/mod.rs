//! Client for the hosted assistant API.
//!
//! [`AssistantApi`] is the seam between the route handler and the service: the handler only ever
//! talks to the trait, [`AssistantClient`] implements it over HTTP, and tests swap in a recording
//! mock.

mod client;
pub mod events;
pub mod models;

use async_trait::async_trait;
use bytes::Bytes;

pub use client::AssistantClient;
pub use events::{RunEvent, RunEventStream};

use crate::errors::Result;
use crate::types::FileId;
use models::{CreateMessageRequest, FileBatch, FileObject, Thread, ThreadMessage, ToolOutput, VectorStore};

/// The subset of the assistant API used to relay a chat turn.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// All vector stores visible to the API key.
    async fn list_vector_stores(&self) -> Result<Vec<VectorStore>>;

    async fn create_vector_store(&self, name: &str) -> Result<VectorStore>;

    /// Upload a file with `purpose=assistants`.
    async fn upload_file(&self, name: &str, mime_type: &str, bytes: Bytes) -> Result<FileObject>;

    async fn create_file_batch(&self, vector_store_id: &str, file_ids: &[FileId]) -> Result<FileBatch>;

    async fn get_file_batch(&self, vector_store_id: &str, batch_id: &str) -> Result<FileBatch>;

    /// Point the assistant's `file_search` tool at the given vector stores.
    async fn update_assistant_vector_stores(&self, assistant_id: &str, vector_store_ids: &[String]) -> Result<()>;

    async fn create_thread(&self) -> Result<Thread>;

    async fn create_message(&self, thread_id: &str, request: CreateMessageRequest) -> Result<ThreadMessage>;

    /// Start a run on the thread and stream its events.
    async fn stream_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunEventStream>;

    /// Hand tool results back to a paused run and stream the rest of it.
    async fn submit_tool_outputs_stream(&self, thread_id: &str, run_id: &str, outputs: Vec<ToolOutput>) -> Result<RunEventStream>;
}
