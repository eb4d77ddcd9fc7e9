//! HTTP handler for the assistant route.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    response::Response,
};
use tracing::{debug, info, instrument};

use crate::{
    AppState,
    envelope::ChatRequest,
    errors::{Error, Result},
    openapi::extra_types,
    stream::{assistant_response, relay_run},
    uploads,
    upstream::models::CreateMessageRequest,
};

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

#[utoipa::path(
    post,
    path = "/api/assistant",
    tag = "assistant",
    summary = "Send a message",
    description = "Post one user message, optionally with a file, to an assistant thread and stream the run back. \
                   The `message` field carries the stringified envelope `{message, threadId, isAppended, file}`.",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Streamed reply, one `code:json` part per line", body = String, content_type = "text/plain"),
        (status = 400, description = "Request body is not JSON", body = extra_types::ClientErrorResponse),
        (status = 500, description = "Malformed envelope, missing configuration or assistant API failure", body = extra_types::ServerErrorResponse),
    )
)]
#[instrument(skip_all, fields(thread_id = tracing::field::Empty))]
pub async fn send_message(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    if !is_json(&headers) {
        return Err(Error::UnsupportedContentType);
    }

    let request: ChatRequest = serde_json::from_slice(&body)?;
    let envelope = request.envelope()?;
    debug!(
        is_appended = envelope.is_appended,
        has_file = envelope.file.is_some(),
        "Parsed message envelope"
    );

    let assistant_id = state
        .config
        .assistant_id
        .clone()
        .ok_or(Error::NotConfigured { setting: "ASSISTANT_ID" })?;

    let attachments = match (envelope.is_appended, &envelope.file) {
        (true, Some(file)) => uploads::prepare_attachment(state.api.as_ref(), &state.config.uploads, &assistant_id, file).await?,
        (true, None) => {
            info!("No file uploaded");
            Vec::new()
        }
        (false, _) => {
            info!(thread_id = ?envelope.effective_thread_id(), "Normal submission");
            Vec::new()
        }
    };

    let thread_id = match envelope.effective_thread_id() {
        Some(id) => id.to_string(),
        None => {
            let thread = state.api.create_thread().await?;
            info!(thread_id = %thread.id, "Created thread");
            thread.id
        }
    };
    tracing::Span::current().record("thread_id", thread_id.as_str());

    let message = state
        .api
        .create_message(&thread_id, CreateMessageRequest::user(envelope.message, attachments))
        .await?;
    debug!(message_id = %message.id, "Created user message");

    let api = state.api.clone();
    let tools = state.tools.clone();
    let run_thread_id = thread_id.clone();
    Ok(assistant_response(
        thread_id,
        message.id,
        state.config.stream_buffer,
        move |sink| async move {
            relay_run(api.as_ref(), &tools, &run_thread_id, &assistant_id, &sink).await?;
            Ok(())
        },
    ))
}
