//! Test doubles and fixtures shared by the unit and HTTP tests.

use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::errors::{Error, Result};
use crate::tools::ToolRegistry;
use crate::types::FileId;
use crate::upstream::models::{
    CreateMessageRequest, FileBatch, FileCounts, FileObject, FunctionCall, RequiredAction, Run, SubmitToolOutputs, Thread, ThreadMessage,
    ToolCall, ToolOutput, VectorStore,
};
use crate::upstream::{AssistantApi, RunEvent, RunEventStream};

/// One recorded call against [`MockAssistantApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListVectorStores,
    CreateVectorStore { name: String },
    UploadFile { name: String, mime_type: String, size: usize },
    CreateFileBatch { vector_store_id: String, file_ids: Vec<FileId> },
    GetFileBatch { vector_store_id: String, batch_id: String },
    UpdateAssistant { assistant_id: String, vector_store_ids: Vec<String> },
    CreateThread,
    CreateMessage { thread_id: String, request: CreateMessageRequest },
    StreamRun { thread_id: String, assistant_id: String },
    SubmitToolOutputs { thread_id: String, run_id: String, outputs: Vec<ToolOutput> },
}

impl Call {
    fn op(&self) -> &'static str {
        match self {
            Call::ListVectorStores => "list_vector_stores",
            Call::CreateVectorStore { .. } => "create_vector_store",
            Call::UploadFile { .. } => "upload_file",
            Call::CreateFileBatch { .. } => "create_file_batch",
            Call::GetFileBatch { .. } => "get_file_batch",
            Call::UpdateAssistant { .. } => "update_assistant",
            Call::CreateThread => "create_thread",
            Call::CreateMessage { .. } => "create_message",
            Call::StreamRun { .. } => "stream_run",
            Call::SubmitToolOutputs { .. } => "submit_tool_outputs",
        }
    }
}

/// An in-memory [`AssistantApi`] that records every call and replays scripted runs.
#[derive(Default)]
pub struct MockAssistantApi {
    calls: Mutex<Vec<Call>>,
    vector_stores: Mutex<Vec<VectorStore>>,
    batch_statuses: Mutex<VecDeque<String>>,
    runs: Mutex<VecDeque<Vec<RunEvent>>>,
    failing: Mutex<Option<(&'static str, u16)>>,
    uploads: Mutex<u32>,
    messages: Mutex<u32>,
}

impl MockAssistantApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector_store(self, id: &str, name: &str) -> Self {
        self.vector_stores.lock().unwrap().push(VectorStore {
            id: id.to_string(),
            name: Some(name.to_string()),
        });
        self
    }

    /// Statuses handed out by `create_file_batch` and then each `get_file_batch`; `completed` once exhausted.
    pub fn with_batch_statuses<'a>(self, statuses: impl IntoIterator<Item = &'a str>) -> Self {
        self.batch_statuses
            .lock()
            .unwrap()
            .extend(statuses.into_iter().map(str::to_string));
        self
    }

    /// Queue the events of one run stream. Streams are consumed in order by `stream_run` and
    /// `submit_tool_outputs_stream`; once the queue is empty a short completed run is replayed.
    pub fn with_run(self, events: Vec<RunEvent>) -> Self {
        self.runs.lock().unwrap().push_back(events);
        self
    }

    /// Make the named operation fail with an upstream error of the given status.
    pub fn failing(self, op: &'static str, status: u16) -> Self {
        *self.failing.lock().unwrap() = Some((op, status));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: Call) -> Result<()> {
        let op = call.op();
        self.calls.lock().unwrap().push(call);
        match *self.failing.lock().unwrap() {
            Some((failing, status)) if failing == op => Err(Error::Upstream {
                status,
                body: format!("{op} failed"),
            }),
            _ => Ok(()),
        }
    }

    fn next_batch(&self, vector_store_id: &str) -> FileBatch {
        let status = self
            .batch_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "completed".to_string());
        FileBatch {
            id: "vsfb_1".to_string(),
            vector_store_id: Some(vector_store_id.to_string()),
            file_counts: FileCounts {
                completed: u64::from(status == "completed"),
                total: 1,
                ..Default::default()
            },
            status,
        }
    }

    fn next_run(&self) -> RunEventStream {
        let events = self
            .runs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| completed_run("msg_assistant", &["Hello"]));
        futures::stream::iter(events.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl AssistantApi for MockAssistantApi {
    async fn list_vector_stores(&self) -> Result<Vec<VectorStore>> {
        self.record(Call::ListVectorStores)?;
        Ok(self.vector_stores.lock().unwrap().clone())
    }

    async fn create_vector_store(&self, name: &str) -> Result<VectorStore> {
        self.record(Call::CreateVectorStore { name: name.to_string() })?;
        let store = VectorStore {
            id: "vs_new".to_string(),
            name: Some(name.to_string()),
        };
        self.vector_stores.lock().unwrap().push(store.clone());
        Ok(store)
    }

    async fn upload_file(&self, name: &str, mime_type: &str, bytes: Bytes) -> Result<FileObject> {
        self.record(Call::UploadFile {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len(),
        })?;
        let mut uploads = self.uploads.lock().unwrap();
        *uploads += 1;
        Ok(FileObject {
            id: format!("file_{}", *uploads),
            filename: Some(name.to_string()),
            bytes: Some(bytes.len() as u64),
        })
    }

    async fn create_file_batch(&self, vector_store_id: &str, file_ids: &[FileId]) -> Result<FileBatch> {
        self.record(Call::CreateFileBatch {
            vector_store_id: vector_store_id.to_string(),
            file_ids: file_ids.to_vec(),
        })?;
        Ok(self.next_batch(vector_store_id))
    }

    async fn get_file_batch(&self, vector_store_id: &str, batch_id: &str) -> Result<FileBatch> {
        self.record(Call::GetFileBatch {
            vector_store_id: vector_store_id.to_string(),
            batch_id: batch_id.to_string(),
        })?;
        Ok(self.next_batch(vector_store_id))
    }

    async fn update_assistant_vector_stores(&self, assistant_id: &str, vector_store_ids: &[String]) -> Result<()> {
        self.record(Call::UpdateAssistant {
            assistant_id: assistant_id.to_string(),
            vector_store_ids: vector_store_ids.to_vec(),
        })
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.record(Call::CreateThread)?;
        Ok(Thread {
            id: "thread_new".to_string(),
        })
    }

    async fn create_message(&self, thread_id: &str, request: CreateMessageRequest) -> Result<ThreadMessage> {
        self.record(Call::CreateMessage {
            thread_id: thread_id.to_string(),
            request,
        })?;
        let mut messages = self.messages.lock().unwrap();
        *messages += 1;
        Ok(ThreadMessage {
            id: format!("msg_user_{}", *messages),
            thread_id: Some(thread_id.to_string()),
            role: Some("user".to_string()),
            content: Vec::new(),
        })
    }

    async fn stream_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunEventStream> {
        self.record(Call::StreamRun {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
        })?;
        Ok(self.next_run())
    }

    async fn submit_tool_outputs_stream(&self, thread_id: &str, run_id: &str, outputs: Vec<ToolOutput>) -> Result<RunEventStream> {
        self.record(Call::SubmitToolOutputs {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            outputs,
        })?;
        Ok(self.next_run())
    }
}

fn run(id: &str, status: &str) -> Run {
    Run {
        id: id.to_string(),
        thread_id: None,
        status: status.to_string(),
        required_action: None,
        last_error: None,
    }
}

/// Events of a run that writes one assistant message made of `deltas` and completes.
pub fn completed_run(message_id: &str, deltas: &[&str]) -> Vec<RunEvent> {
    let mut events = vec![
        RunEvent::Run {
            event: "thread.run.created".to_string(),
            run: run("run_1", "queued"),
        },
        RunEvent::MessageCreated(ThreadMessage {
            id: message_id.to_string(),
            thread_id: None,
            role: Some("assistant".to_string()),
            content: Vec::new(),
        }),
    ];
    for delta in deltas {
        let delta = serde_json::json!({
            "id": message_id,
            "delta": {"content": [{"index": 0, "type": "text", "text": {"value": delta}}]}
        });
        events.push(RunEvent::MessageDelta(
            serde_json::from_value(delta).expect("delta fixture is valid"),
        ));
    }
    events.push(RunEvent::Run {
        event: "thread.run.completed".to_string(),
        run: run("run_1", "completed"),
    });
    events.push(RunEvent::Done);
    events
}

/// Events of a run that pauses to ask for one function call.
pub fn tool_call_run(run_id: &str, call_id: &str, function: &str) -> Vec<RunEvent> {
    let mut paused = run(run_id, "requires_action");
    paused.required_action = Some(RequiredAction {
        kind: "submit_tool_outputs".to_string(),
        submit_tool_outputs: Some(SubmitToolOutputs {
            tool_calls: vec![ToolCall {
                id: call_id.to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: function.to_string(),
                    arguments: "{}".to_string(),
                },
            }],
        }),
    });
    vec![
        RunEvent::Run {
            event: "thread.run.requires_action".to_string(),
            run: paused,
        },
        RunEvent::Done,
    ]
}

pub fn create_test_config() -> crate::config::Config {
    crate::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        assistant_id: Some("asst_test".to_string()),
        uploads: crate::config::UploadsConfig {
            poll_interval: std::time::Duration::from_millis(1),
            max_polls: 5,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Build a test server around `api` with the default (empty) tool registry.
pub fn create_test_app(config: crate::config::Config, api: Arc<MockAssistantApi>) -> TestServer {
    let app = crate::Application::with_api(config, api, ToolRegistry::new()).expect("Failed to create application");
    app.into_test_server()
}
