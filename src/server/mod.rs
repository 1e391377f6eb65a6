//! JSON API envelope on top of axum.
//!
//! Every handled response is HTTP 200 with `{code, message, data?}`:
//! `code = 0, message = "ok"` on success and `code = -1` with a readable
//! message on failure. Only unexpected failures (internal errors and
//! panics) answer 500.

mod chat;

pub use chat::{chat_routes, ChatBody, ChatReply};

use std::any::Any;
use std::fmt;

use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::error::{panic_message, ErrorCategory, GoxError};

pub const CODE_OK: i32 = 0;
pub const CODE_ERROR: i32 = -1;
pub const MESSAGE_OK: &str = "ok";
pub const INVALID_PARAMS: &str = "invalid request parameters";
pub const UNKNOWN_ERROR: &str = "unknown error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl Envelope<()> {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: CODE_ERROR,
            message: message.into(),
            data: None,
        }
    }
}

/// Successful handler output, wrapped as `{code: 0, message: "ok", data}`.
#[derive(Debug, Clone)]
pub struct ApiData<T>(pub T);

impl<T: Serialize> IntoResponse for ApiData<T> {
    fn into_response(self) -> Response {
        Json(Envelope {
            code: CODE_OK,
            message: MESSAGE_OK.to_string(),
            data: Some(self.0),
        })
        .into_response()
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Handler failure.
///
/// A plain message answers 200 with the error envelope; the optional source
/// is logged but never sent to the client. [`ApiError::internal`] answers
/// 500 with a generic message.
pub struct ApiError {
    message: String,
    source: Option<BoxError>,
    internal: bool,
}

impl ApiError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            internal: false,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn internal(source: impl Into<BoxError>) -> Self {
        Self::msg(UNKNOWN_ERROR).with_source(source).into_internal()
    }

    fn into_internal(mut self) -> Self {
        self.internal = true;
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiError")
            .field("message", &self.message)
            .field("source", &self.source.as_ref().map(ToString::to_string))
            .field("internal", &self.internal)
            .finish()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CODE_ERROR}: {}", self.message)
    }
}

impl From<GoxError> for ApiError {
    fn from(err: GoxError) -> Self {
        match err.category() {
            ErrorCategory::Validation => Self::msg(err.to_string()),
            _ => Self::internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(source) = &self.source {
            tracing::error!(error = %source, "{}", self.message);
        }
        let status = if self.internal {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        (status, Json(Envelope::error(self.message))).into_response()
    }
}

/// JSON body extractor whose rejection is the error envelope.
#[derive(Debug, Clone)]
pub struct JsonApi<T>(pub T);

impl<T, S> FromRequest<S> for JsonApi<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "request body rejected");
                Err(ApiError::msg(INVALID_PARAMS))
            }
        }
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = %panic_message(payload.as_ref()), "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope::error(UNKNOWN_ERROR)),
    )
        .into_response()
}

/// Wrap `routes` with panic recovery and request tracing.
#[must_use]
pub fn router(routes: Router) -> Router {
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

/// Bind `address` and serve until the process exits.
///
/// # Errors
///
/// Returns [`GoxError::Transport`] when binding or serving fails.
pub async fn serve(address: &str, routes: Router) -> Result<(), GoxError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| GoxError::Transport(format!("Failed to bind {address}: {e}")))?;
    serve_listener(listener, routes, CancellationToken::new()).await
}

/// Serve on an already bound listener until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`GoxError::Transport`] when the server loop fails.
pub async fn serve_listener(
    listener: TcpListener,
    routes: Router,
    shutdown: CancellationToken,
) -> Result<(), GoxError> {
    if let Ok(address) = listener.local_addr() {
        tracing::info!(%address, "api server listening");
    }
    axum::serve(listener, router(routes))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| GoxError::Transport(format!("Server error: {e}")))
}
