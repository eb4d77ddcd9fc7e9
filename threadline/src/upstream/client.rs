//! HTTP implementation of [`AssistantApi`].

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, header, multipart};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::events::{RunEventStream, run_events};
use super::models::{
    CreateFileBatchRequest, CreateMessageRequest, CreateRunRequest, CreateVectorStoreRequest, FileBatch, FileObject, ListResponse,
    SubmitToolOutputsRequest, Thread, ThreadMessage, ToolOutput, VectorStore,
};
use super::AssistantApi;
use crate::config::OpenAiConfig;
use crate::errors::{Error, Result};
use crate::types::FileId;

/// Header opting into the v2 assistants endpoints
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Page size used when walking list endpoints
const LIST_PAGE_SIZE: u32 = 100;

/// The concrete implementation of [`AssistantApi`], talking to the service with `reqwest`.
#[derive(Clone)]
pub struct AssistantClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    organization: Option<String>,
    request_timeout: Duration,
}

impl AssistantClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        // reqwest is built without a default crypto provider
        if rustls::crypto::CryptoProvider::get_default().is_none() {
            let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        }

        // No client-wide timeout: it would also cut off long-running streams
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        if config.api_key.is_none() {
            tracing::warn!("No API key configured for the assistant API; requests will be unauthenticated");
        }

        Ok(Self {
            client,
            base_url: ensure_slash(&config.base_url),
            api_key: config.api_key.clone(),
            organization: config.organization.clone(),
            request_timeout: config.request_timeout,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Other(anyhow!("Failed to construct URL for {}: {}", path, e)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request.header(BETA_HEADER.0, BETA_HEADER.1);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        if let Some(organization) = &self.organization {
            request = request.header("OpenAI-Organization", organization);
        }
        request
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authorize(request).timeout(self.request_timeout).send().await?;
        let response = check_status(response).await?;

        // Get the response body as text first for logging
        let body_text = response.text().await?;
        tracing::trace!("Assistant API response body: {}", body_text);

        serde_json::from_str::<T>(&body_text).map_err(|e| {
            tracing::error!("Failed to parse assistant API response as JSON. Error: {}", e);
            tracing::error!("Response body was: {}", body_text);
            Error::Other(anyhow!("error decoding response body: {}", e))
        })
    }

    async fn open_stream(&self, request: RequestBuilder) -> Result<RunEventStream> {
        let response = self
            .authorize(request)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(run_events(response.bytes_stream()))
    }
}

/// Makes sure a url has a trailing slash.
///
/// Joining '/v1' with 'threads' gives '/threads', but '/v1/' with 'threads' gives '/v1/threads'.
/// Call this before calling .join
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(%status, %url, "Assistant API request failed");
    Err(Error::Upstream {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AssistantApi for AssistantClient {
    #[instrument(skip(self), err)]
    async fn list_vector_stores(&self) -> Result<Vec<VectorStore>> {
        let mut stores = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.url("vector_stores")?)
                .query(&[("limit", LIST_PAGE_SIZE.to_string())]);
            if let Some(cursor) = &after {
                request = request.query(&[("after", cursor)]);
            }

            let page: ListResponse<VectorStore> = self.send_json(request).await?;
            let next = page.last_id.clone().or_else(|| page.data.last().map(|store| store.id.clone()));
            stores.extend(page.data);

            match next {
                Some(cursor) if page.has_more => after = Some(cursor),
                _ => break,
            }
        }

        debug!("Found {} vector stores", stores.len());
        Ok(stores)
    }

    #[instrument(skip(self), err)]
    async fn create_vector_store(&self, name: &str) -> Result<VectorStore> {
        let request = self
            .client
            .post(self.url("vector_stores")?)
            .json(&CreateVectorStoreRequest { name });
        self.send_json(request).await
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()), err)]
    async fn upload_file(&self, name: &str, mime_type: &str, bytes: Bytes) -> Result<FileObject> {
        let mut part = multipart::Part::bytes(bytes.to_vec()).file_name(name.to_string());
        if !mime_type.is_empty() {
            part = part
                .mime_str(mime_type)
                .map_err(|e| anyhow!("Invalid MIME type {:?}: {}", mime_type, e))?;
        }
        let form = multipart::Form::new().text("purpose", "assistants").part("file", part);

        let request = self.client.post(self.url("files")?).multipart(form);
        self.send_json(request).await
    }

    #[instrument(skip(self), err)]
    async fn create_file_batch(&self, vector_store_id: &str, file_ids: &[FileId]) -> Result<FileBatch> {
        let request = self
            .client
            .post(self.url(&format!("vector_stores/{vector_store_id}/file_batches"))?)
            .json(&CreateFileBatchRequest { file_ids });
        self.send_json(request).await
    }

    #[instrument(skip(self), err)]
    async fn get_file_batch(&self, vector_store_id: &str, batch_id: &str) -> Result<FileBatch> {
        let request = self
            .client
            .get(self.url(&format!("vector_stores/{vector_store_id}/file_batches/{batch_id}"))?);
        self.send_json(request).await
    }

    #[instrument(skip(self), err)]
    async fn update_assistant_vector_stores(&self, assistant_id: &str, vector_store_ids: &[String]) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("assistants/{assistant_id}"))?)
            .json(&json!({
                "tool_resources": { "file_search": { "vector_store_ids": vector_store_ids } }
            }));
        let _: serde_json::Value = self.send_json(request).await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn create_thread(&self) -> Result<Thread> {
        let request = self.client.post(self.url("threads")?).json(&json!({}));
        self.send_json(request).await
    }

    #[instrument(skip(self, request), fields(attachments = request.attachments.len()), err)]
    async fn create_message(&self, thread_id: &str, request: CreateMessageRequest) -> Result<ThreadMessage> {
        let request = self
            .client
            .post(self.url(&format!("threads/{thread_id}/messages"))?)
            .json(&request);
        self.send_json(request).await
    }

    #[instrument(skip(self), err)]
    async fn stream_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunEventStream> {
        let request = self
            .client
            .post(self.url(&format!("threads/{thread_id}/runs"))?)
            .json(&CreateRunRequest { assistant_id, stream: true });
        self.open_stream(request).await
    }

    #[instrument(skip(self, outputs), fields(outputs = outputs.len()), err)]
    async fn submit_tool_outputs_stream(&self, thread_id: &str, run_id: &str, outputs: Vec<ToolOutput>) -> Result<RunEventStream> {
        let request = self
            .client
            .post(self.url(&format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"))?)
            .json(&SubmitToolOutputsRequest {
                tool_outputs: &outputs,
                stream: true,
            });
        self.open_stream(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::RunEvent;
    use futures::StreamExt;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AssistantClient {
        let config = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            base_url: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
            ..Default::default()
        };
        AssistantClient::new(&config).unwrap()
    }

    #[test]
    fn test_ensure_slash() {
        let url = Url::parse("https://api.openai.com/v1").unwrap();
        assert_eq!(ensure_slash(&url).join("threads").unwrap().as_str(), "https://api.openai.com/v1/threads");

        let url = Url::parse("https://api.openai.com/v1/").unwrap();
        assert_eq!(ensure_slash(&url).as_str(), "https://api.openai.com/v1/");
    }

    #[tokio::test]
    async fn test_create_thread_sends_auth_and_beta_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/threads"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("openai-beta", "assistants=v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_abc", "object": "thread"})))
            .expect(1)
            .mount(&server)
            .await;

        let thread = client_for(&server).create_thread().await.unwrap();
        assert_eq!(thread.id, "thread_abc");
    }

    #[tokio::test]
    async fn test_non_success_becomes_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/threads/thread_missing/messages"))
            .respond_with(ResponseTemplate::new(404).set_body_string("No thread found"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_message("thread_missing", CreateMessageRequest::user("hi", vec![]))
            .await
            .unwrap_err();

        match err {
            Error::Upstream { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "No thread found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_vector_stores_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/vector_stores"))
            .and(query_param("after", "vs_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "vs_2", "name": "Uploaded Files"}],
                "has_more": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/vector_stores"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "vs_1", "name": "Other"}],
                "last_id": "vs_1",
                "has_more": true
            })))
            .mount(&server)
            .await;

        let stores = client_for(&server).list_vector_stores().await.unwrap();
        let ids: Vec<_> = stores.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["vs_1", "vs_2"]);
    }

    #[tokio::test]
    async fn test_upload_file_is_multipart_with_purpose() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/files"))
            .and(body_string_contains("name=\"purpose\""))
            .and(body_string_contains("assistants"))
            .and(body_string_contains("filename=\"notes.txt\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file_1", "filename": "notes.txt", "bytes": 5})))
            .expect(1)
            .mount(&server)
            .await;

        let file = client_for(&server)
            .upload_file("notes.txt", "text/plain", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(file.id, "file_1");
    }

    #[tokio::test]
    async fn test_update_assistant_sets_file_search_stores() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/assistants/asst_1"))
            .and(body_json(json!({"tool_resources": {"file_search": {"vector_store_ids": ["vs_1"]}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "asst_1"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .update_assistant_vector_stores("asst_1", &["vs_1".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stream_run_parses_events() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: thread.message.created\n",
            "data: {\"id\":\"msg_2\",\"role\":\"assistant\",\"content\":[]}\n\n",
            "event: thread.message.delta\n",
            "data: {\"id\":\"msg_2\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"Hello\"}}]}}\n\n",
            "event: thread.run.completed\n",
            "data: {\"id\":\"run_1\",\"status\":\"completed\"}\n\n",
            "event: done\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/threads/thread_1/runs"))
            .and(body_json(json!({"assistant_id": "asst_1", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let stream = client_for(&server).stream_run("thread_1", "asst_1").await.unwrap();
        let events: Vec<RunEvent> = stream.map(|e| e.unwrap()).collect().await;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[1], RunEvent::MessageDelta(d) if d.texts().eq(["Hello"])));
        assert_eq!(events[2].final_run().map(|r| r.id.as_str()), Some("run_1"));
    }

    #[tokio::test]
    async fn test_submit_tool_outputs_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/threads/thread_1/runs/run_1/submit_tool_outputs"))
            .and(body_json(json!({
                "tool_outputs": [{"tool_call_id": "call_1", "output": "42"}],
                "stream": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw("event: done\ndata: [DONE]\n\n", "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let outputs = vec![ToolOutput {
            tool_call_id: "call_1".into(),
            output: "42".into(),
        }];
        let stream = client_for(&server)
            .submit_tool_outputs_stream("thread_1", "run_1", outputs)
            .await
            .unwrap();
        let events: Vec<RunEvent> = stream.map(|e| e.unwrap()).collect().await;
        assert_eq!(events, vec![RunEvent::Done]);
    }
}
