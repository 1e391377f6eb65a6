//! `POST /chat`: one-shot chat completions behind the JSON envelope.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::openai::{simple_prompt, OpenAi};

use super::{ApiData, ApiError, JsonApi};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBody {
    pub prompt: String,
    #[serde(default)]
    pub system: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

async fn chat_handler(
    State(openai): State<Arc<OpenAi>>,
    JsonApi(body): JsonApi<ChatBody>,
) -> Result<ApiData<ChatReply>, ApiError> {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::msg("prompt is required"));
    }
    let request = openai.request(simple_prompt(&body.prompt, &body.system));
    let reply = openai.chat(&CancellationToken::new(), request).await?;
    Ok(ApiData(ChatReply { reply }))
}

/// Routes serving chat completions from `openai`.
pub fn chat_routes(openai: Arc<OpenAi>) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .with_state(openai)
}
