/// Crate-wide error type.
///
/// Every fallible operation in the crate reports one of these. A streaming
/// call yields exactly one terminal `GoxError` (or success); see
/// [`crate::stream::run_pipeline`] for how the first error wins.
#[derive(Debug, thiserror::Error)]
pub enum GoxError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: {message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Sink error: {0}")]
    Sink(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category, used for logging and for mapping onto the API envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Upstream,
    Transport,
    Cancelled,
    Internal,
}

impl GoxError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GoxError::Config(_) | GoxError::InvalidRequest(_) => ErrorCategory::Validation,
            GoxError::Upstream { .. } => ErrorCategory::Upstream,
            GoxError::Transport(_) | GoxError::Decode(_) => ErrorCategory::Transport,
            GoxError::Cancelled => ErrorCategory::Cancelled,
            GoxError::Sink(_) | GoxError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status carried by an upstream failure, if any.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            GoxError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GoxError::Cancelled)
    }
}

impl From<reqwest::Error> for GoxError {
    fn from(err: reqwest::Error) -> Self {
        GoxError::Transport(err.to_string())
    }
}

impl From<crate::config::ConfigError> for GoxError {
    fn from(err: crate::config::ConfigError) -> Self {
        GoxError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for GoxError {
    fn from(err: serde_json::Error) -> Self {
        GoxError::Decode(err.to_string())
    }
}

/// Render a panic payload caught by `catch_unwind` or a join handle.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
