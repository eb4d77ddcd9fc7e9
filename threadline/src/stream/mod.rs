//! Relaying a run to the browser.
//!
//! [`assistant_response`] opens the response body and writes the control part straight away. A
//! spawned task then drives the run: [`forward_stream`] turns upstream run events into
//! [`StreamPart`]s, and [`relay_run`] keeps submitting tool outputs while the run pauses for them.
//! Whatever error ends the task is written as a final error part.

pub mod parts;

use anyhow::anyhow;
use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info};

pub use parts::StreamPart;

use crate::errors::{Error, Result};
use crate::tools::ToolRegistry;
use crate::types::{MessageId, ThreadId};
use crate::upstream::models::Run;
use crate::upstream::{AssistantApi, RunEvent, RunEventStream};

pub type PartSender = mpsc::Sender<StreamPart>;

async fn send(sink: &PartSender, part: StreamPart) -> Result<()> {
    sink.send(part)
        .await
        .map_err(|_| Error::Other(anyhow!("client disconnected")))
}

/// Forward one run event stream to `sink`, returning the run the stream finished (or paused) with.
pub async fn forward_stream(mut events: RunEventStream, sink: &PartSender) -> Result<Option<Run>> {
    let mut result = None;

    while let Some(event) = events.next().await {
        match event? {
            RunEvent::MessageCreated(message) => {
                send(
                    sink,
                    StreamPart::AssistantMessage {
                        id: message.id,
                        text: String::new(),
                    },
                )
                .await?;
            }
            RunEvent::MessageDelta(delta) => {
                for text in delta.texts() {
                    send(sink, StreamPart::Text(text.to_string())).await?;
                }
            }
            RunEvent::Error { message } => return Err(Error::Run { message }),
            RunEvent::Done => break,
            event @ RunEvent::Run { .. } => {
                if let Some(run) = event.final_run() {
                    debug!(run_id = %run.id, status = %run.status, "Run reached a final state");
                    result = Some(run.clone());
                }
            }
            RunEvent::MessageCompleted(_) | RunEvent::Other { .. } => {}
        }
    }

    Ok(result)
}

/// Stream a run on the thread, answering tool calls until the run stops asking for them.
pub async fn relay_run(
    api: &dyn AssistantApi,
    tools: &ToolRegistry,
    thread_id: &str,
    assistant_id: &str,
    sink: &PartSender,
) -> Result<Option<Run>> {
    let mut run = forward_stream(api.stream_run(thread_id, assistant_id).await?, sink).await?;

    loop {
        let Some(current) = run.as_ref() else { break };
        let Some(calls) = current.pending_tool_calls() else { break };

        let outputs = tools.resolve(calls).await?;
        let run_id = current.id.clone();
        info!(run_id = %run_id, outputs = outputs.len(), "Submitting tool outputs");
        run = forward_stream(api.submit_tool_outputs_stream(thread_id, &run_id, outputs).await?, sink).await?;
    }

    if let Some(finished) = &run
        && matches!(finished.status.as_str(), "failed" | "expired")
    {
        let message = finished
            .last_error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| format!("run {} {}", finished.id, finished.status));
        return Err(Error::Run { message });
    }

    Ok(run)
}

/// Build the streamed response: control data first, then whatever `process` writes to the sink.
pub fn assistant_response<F, Fut>(thread_id: ThreadId, message_id: MessageId, buffer: usize, process: F) -> Response
where
    F: FnOnce(PartSender) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer);
    let work = process(tx.clone());

    let span = tracing::info_span!("assistant_stream", thread_id = %thread_id);
    tokio::spawn(
        async move {
            let control = StreamPart::AssistantControlData { thread_id, message_id };
            if tx.send(control).await.is_err() {
                debug!("Client disconnected before the stream started");
                return;
            }

            match work.await {
                Ok(()) => debug!("Assistant stream finished"),
                Err(_) if tx.is_closed() => debug!("Client disconnected, stopped forwarding"),
                Err(e) => {
                    error!("Error while streaming assistant response: {:#}", e);
                    let _ = tx.send(StreamPart::Error(e.to_string())).await;
                }
            }
        }
        .instrument(span),
    );

    let body = Body::from_stream(ReceiverStream::new(rx).map(|part| Ok::<_, Infallible>(Bytes::from(part.encode()))));
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}
