//! OpenAI-compatible chat completion client.

mod types;

pub use types::{simple_prompt, ChatRequest, Message, Role, StartHook, StreamSink, WireRequest};

use std::future::Future;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, StreamConfig};
use crate::error::GoxError;
use crate::observability::log_stream_complete;
use crate::stream::run_pipeline;
use crate::transport::header::{authorization, content_type_json, header_map};
use crate::transport::HttpTransport;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

const MESSAGE_CONTENT_POINTER: &str = "/choices/0/message/content";

async fn with_cancel<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, GoxError>
where
    F: Future<Output = Result<T, GoxError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GoxError::Cancelled),
        result = fut => result,
    }
}

/// `choices[0].message.content` of a full completion body; empty when absent.
fn message_content(body: &[u8]) -> Result<String, GoxError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    Ok(match value.pointer(MESSAGE_CONTENT_POINTER) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    })
}

/// Client bound to one upstream base URL and API key.
#[derive(Debug, Clone)]
pub struct OpenAi {
    transport: HttpTransport,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    stream_config: StreamConfig,
}

impl OpenAi {
    #[must_use]
    pub fn new(transport: HttpTransport, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: String::new(),
            temperature: 0.7,
            stream_config: StreamConfig::default(),
        }
    }

    /// Build a client, its transport and request defaults from the app config.
    ///
    /// # Errors
    ///
    /// Returns [`GoxError::Transport`] when the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, GoxError> {
        let transport = HttpTransport::new(&config.client)?;
        let mut client = Self::new(transport, &config.openai.base_url, &config.openai.api_key)
            .with_model(config.openai.model.clone())
            .with_stream_config(config.stream);
        client.temperature = config.openai.temperature;
        Ok(client)
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_stream_config(mut self, stream_config: StreamConfig) -> Self {
        self.stream_config = stream_config;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A non-streaming request using the configured model and temperature.
    #[must_use]
    pub fn request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest::new(self.model.clone(), messages).temperature(self.temperature)
    }

    fn endpoint(&self) -> String {
        format!("{}{CHAT_COMPLETIONS_PATH}", self.base_url)
    }

    fn headers(&self) -> Result<http::HeaderMap, GoxError> {
        Ok(header_map([content_type_json(), authorization(&self.api_key)?]))
    }

    /// Run a chat completion and return the assistant's reply.
    ///
    /// A request with `stream = true` is handed to [`OpenAi::chat_stream`];
    /// the reply then goes to its sink and the returned string is empty.
    ///
    /// # Errors
    ///
    /// [`GoxError::InvalidRequest`] before any I/O, [`GoxError::Upstream`] for
    /// a failure status, [`GoxError::Transport`], [`GoxError::Decode`] when
    /// the body is not JSON, or [`GoxError::Cancelled`].
    pub async fn chat(
        &self,
        cancel: &CancellationToken,
        request: ChatRequest,
    ) -> Result<String, GoxError> {
        request.validate()?;
        if request.stream {
            self.chat_stream(cancel, request).await?;
            return Ok(String::new());
        }

        let headers = self.headers()?;
        let wire = request.wire();
        tracing::debug!(model = %wire.model, messages = wire.messages.len(), "chat request");
        let body = with_cancel(
            cancel,
            self.transport.post(&self.endpoint(), &wire, &headers),
        )
        .await?;
        message_content(&body)
    }

    /// Stream a chat completion into the request's sink.
    ///
    /// `on_start` runs once the upstream has accepted the request. The reply
    /// is delivered in paced, UTF-8-complete chunks with reasoning text
    /// wrapped in `<think>` / `</think>`.
    ///
    /// # Errors
    ///
    /// The first of: validation, connection or status failure, the sink's
    /// error, a recovered sink panic, a read error, or [`GoxError::Cancelled`].
    pub async fn chat_stream(
        &self,
        cancel: &CancellationToken,
        mut request: ChatRequest,
    ) -> Result<(), GoxError> {
        request.stream = true;
        request.validate()?;
        let Some(mut sink) = request.on_stream.take() else {
            return Err(GoxError::InvalidRequest(
                "on_stream is required when stream is true".to_string(),
            ));
        };

        let headers = self.headers()?;
        let start = Instant::now();
        let wire = request.wire();
        tracing::debug!(model = %wire.model, messages = wire.messages.len(), "chat stream request");
        let body = with_cancel(
            cancel,
            self.transport.post_reader(&self.endpoint(), &wire, &headers),
        )
        .await?;

        if let Some(on_start) = request.on_start.take() {
            on_start();
        }

        match run_pipeline(body, cancel, self.stream_config, &mut sink).await {
            Ok(stats) => {
                log_stream_complete(&request.model, stats.chunks, stats.bytes, start);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(model = %request.model, error = %err, "chat stream failed");
                Err(err)
            }
        }
    }
}
