//! Server-sent events emitted by a streaming run.

use anyhow::anyhow;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt, stream::BoxStream};
use serde::Deserialize;
use std::fmt;
use tracing::{trace, warn};

use super::models::{MessageDelta, Run, ThreadMessage};
use crate::errors::{Error, Result};

pub type RunEventStream = BoxStream<'static, Result<RunEvent>>;

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Any `thread.run.<status>` event; `event` keeps the full name
    Run { event: String, run: Run },
    MessageCreated(ThreadMessage),
    MessageDelta(MessageDelta),
    MessageCompleted(ThreadMessage),
    /// Events the relay does not act on (`thread.created`, `thread.run.step.*`, ...)
    Other { event: String },
    /// The service reported an error mid-stream
    Error { message: String },
    Done,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Box<ErrorPayload>>,
}

impl ErrorPayload {
    fn into_message(self) -> String {
        self.message
            .or_else(|| self.error.map(|inner| inner.into_message()))
            .unwrap_or_else(|| "An error occurred during streaming".to_string())
    }
}

impl RunEvent {
    /// Decode one SSE frame.
    pub fn from_sse(event: &str, data: &str) -> Result<Self> {
        if event == "done" || data == "[DONE]" {
            return Ok(RunEvent::Done);
        }

        let decode_err = |e: serde_json::Error| Error::Other(anyhow!("Failed to decode {} event: {}, data: {}", event, e, data));

        match event {
            "error" => {
                let message = serde_json::from_str::<ErrorPayload>(data)
                    .map(ErrorPayload::into_message)
                    .unwrap_or_else(|_| data.to_string());
                Ok(RunEvent::Error { message })
            }
            "thread.message.created" => Ok(RunEvent::MessageCreated(serde_json::from_str(data).map_err(decode_err)?)),
            "thread.message.delta" => Ok(RunEvent::MessageDelta(serde_json::from_str(data).map_err(decode_err)?)),
            "thread.message.completed" => Ok(RunEvent::MessageCompleted(serde_json::from_str(data).map_err(decode_err)?)),
            e if e.starts_with("thread.run.") && !e.starts_with("thread.run.step.") => Ok(RunEvent::Run {
                event: e.to_string(),
                run: serde_json::from_str(data).map_err(decode_err)?,
            }),
            other => Ok(RunEvent::Other { event: other.to_string() }),
        }
    }

    /// The run carried by this event when it ends (or pauses) the stream.
    pub fn final_run(&self) -> Option<&Run> {
        match self {
            RunEvent::Run { event, run } => match event.as_str() {
                "thread.run.completed"
                | "thread.run.requires_action"
                | "thread.run.failed"
                | "thread.run.cancelled"
                | "thread.run.expired"
                | "thread.run.incomplete" => Some(run),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Turn a raw SSE byte stream into run events.
pub fn run_events<S, E>(bytes: S) -> RunEventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    bytes
        .eventsource()
        .map(|frame| match frame {
            Ok(frame) => {
                trace!(event = %frame.event, "Run stream event");
                if frame.event == "message" {
                    // eventsource-stream names frames without an `event:` line "message"
                    warn!("Received run stream frame without an event name: {}", frame.data);
                }
                RunEvent::from_sse(&frame.event, &frame.data)
            }
            Err(e) => Err(Error::Other(anyhow!("SSE stream error: {}", e))),
        })
        .boxed()
}
