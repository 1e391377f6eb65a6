use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GoxError;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// A user prompt, preceded by a system message when `system` is non-empty.
#[must_use]
pub fn simple_prompt(user: &str, system: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(user));
    messages
}

/// Receives paced, UTF-8-complete chunks of a streamed reply. Returning an
/// error stops the stream and becomes the call's result.
pub type StreamSink = Box<dyn FnMut(&[u8]) -> Result<(), GoxError> + Send>;

/// Invoked once after the upstream accepted a streaming request.
pub type StartHook = Box<dyn FnOnce() + Send>;

/// Chat completion request. The callbacks stay local; only
/// [`ChatRequest::wire`] goes over the network.
pub struct ChatRequest {
    pub stream: bool,
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub on_stream: Option<StreamSink>,
    pub on_start: Option<StartHook>,
}

/// Upstream body `{stream, model, messages, temperature}`.
///
/// Borrows only plain data, so it can be held across an await while the
/// request's callbacks stay behind.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WireRequest<'a> {
    pub stream: bool,
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f64,
}

impl ChatRequest {
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            stream: false,
            model: model.into(),
            messages,
            temperature: 0.7,
            on_stream: None,
            on_start: None,
        }
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Switch to streaming and deliver the reply through `sink`.
    #[must_use]
    pub fn stream_to<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&[u8]) -> Result<(), GoxError> + Send + 'static,
    {
        self.stream = true;
        self.on_stream = Some(Box::new(sink));
        self
    }

    #[must_use]
    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_start = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn wire(&self) -> WireRequest<'_> {
        WireRequest {
            stream: self.stream,
            model: &self.model,
            messages: &self.messages,
            temperature: self.temperature,
        }
    }

    /// Checks performed before any network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`GoxError::InvalidRequest`] describing the first problem found.
    pub fn validate(&self) -> Result<(), GoxError> {
        if self.stream && self.on_stream.is_none() {
            return Err(GoxError::InvalidRequest(
                "on_stream is required when stream is true".to_string(),
            ));
        }
        if self.messages.is_empty() {
            return Err(GoxError::InvalidRequest(
                "request messages is empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(GoxError::InvalidRequest("request model is empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatRequest")
            .field("stream", &self.stream)
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("temperature", &self.temperature)
            .field("on_stream", &self.on_stream.is_some())
            .field("on_start", &self.on_start.is_some())
            .finish()
    }
}
