//! Client-side state of the chat form.
//!
//! The embedded page (`static/index.html`) does this in the browser; [`PromptForm`] and
//! [`Transcript`] hold the same rules in Rust so that any client built on this crate, and the
//! tests, serialize submissions and read replies exactly like the page does.

use crate::envelope::{ChatRequest, FileUpload, MessageEnvelope};
use crate::errors::Result;
use crate::stream::StreamPart;
use crate::types::{MessageId, ThreadId};

/// Input box, selected file and the thread the conversation is on.
#[derive(Debug, Clone, Default)]
pub struct PromptForm {
    input: String,
    selected_file: Option<FileUpload>,
    thread_id: Option<ThreadId>,
}

impl PromptForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Remember a file picked in the form; its bytes travel base64-encoded.
    pub fn select_file(&mut self, name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) {
        self.selected_file = Some(FileUpload::from_bytes(name, mime_type, bytes));
    }

    pub fn selected_file(&self) -> Option<&FileUpload> {
        self.selected_file.as_ref()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Build the request for the current input.
    ///
    /// The input is cleared in every case. Blank input yields `None` and keeps the selected file;
    /// otherwise the file, if any, is sent with `isAppended: "true"` and then cleared.
    pub fn submit(&mut self) -> Result<Option<ChatRequest>> {
        let value = std::mem::take(&mut self.input).trim().to_string();
        if value.is_empty() {
            return Ok(None);
        }

        let mut envelope = MessageEnvelope::new(value, self.thread_id.clone());
        if let Some(file) = self.selected_file.take() {
            envelope = envelope.with_file(file);
        }
        envelope.to_request().map(Some)
    }

    /// Track the thread announced by a reply so the next submission continues it.
    pub fn observe(&mut self, part: &StreamPart) {
        if let StreamPart::AssistantControlData { thread_id, .. } = part
            && !thread_id.is_empty()
        {
            self.thread_id = Some(thread_id.clone());
        }
    }
}

/// What the transcript shows for a user message: the envelope's text, or the content itself when
/// it is not an envelope.
pub fn display_text(content: &str) -> String {
    match MessageEnvelope::parse(content) {
        Ok(envelope) => envelope.message,
        Err(_) => content.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Data,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: Option<MessageId>,
    pub role: Role,
    pub content: String,
}

/// Messages of one conversation, built up from submissions and streamed parts.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    error: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The error that ended the last reply, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Add a submitted request as a user message.
    pub fn push_user(&mut self, request: &ChatRequest) {
        self.error = None;
        self.messages.push(ChatMessage {
            id: None,
            role: Role::User,
            content: request.message.clone(),
        });
    }

    pub fn apply(&mut self, part: &StreamPart) {
        match part {
            StreamPart::AssistantControlData { message_id, .. } => {
                if let Some(last) = self.messages.iter_mut().rev().find(|m| m.role == Role::User) {
                    last.id.get_or_insert_with(|| message_id.clone());
                }
            }
            StreamPart::AssistantMessage { id, text } => self.messages.push(ChatMessage {
                id: Some(id.clone()),
                role: Role::Assistant,
                content: text.clone(),
            }),
            StreamPart::Text(delta) => match self.messages.last_mut() {
                Some(last) if last.role == Role::Assistant => last.content.push_str(delta),
                _ => self.messages.push(ChatMessage {
                    id: None,
                    role: Role::Assistant,
                    content: delta.clone(),
                }),
            },
            StreamPart::DataMessage { id, data } => self.messages.push(ChatMessage {
                id: id.clone(),
                role: Role::Data,
                content: data.to_string(),
            }),
            StreamPart::Error(message) => self.error = Some(message.clone()),
        }
    }

    /// Text each message renders as.
    pub fn display(&self) -> Vec<(Role, String)> {
        self.messages
            .iter()
            .map(|message| match message.role {
                Role::User => (Role::User, display_text(&message.content)),
                role => (role, message.content.clone()),
            })
            .collect()
    }
}
