use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::GoxError;

use super::byte_stream::ByteStream;

fn build_reqwest_client(
    timeout: Duration,
    connect_timeout: Duration,
    use_env_proxy: bool,
) -> Result<reqwest::Client, GoxError> {
    let mut builder = reqwest::Client::builder()
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .timeout(timeout);

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| GoxError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// 2xx and 3xx count as success; everything from 400 up is a failure.
#[inline]
pub(crate) fn status_ok(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

/// `"404 Not Found"`, or just the code when the reason is unknown.
#[must_use]
pub(crate) fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

pub(crate) fn upstream_error(status: StatusCode, body: &[u8]) -> GoxError {
    let line = status_line(status);
    let message = if body.is_empty() {
        line
    } else {
        format!("{line}: {}", String::from_utf8_lossy(body))
    };
    GoxError::Upstream {
        status: status.as_u16(),
        message,
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Bytes, GoxError> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| GoxError::InvalidRequest(format!("Serialization error: {e}")))
}

/// Thin HTTP client: JSON bodies out, raw bytes or a live body stream back.
///
/// No retries are performed; callers decide how to react to failures.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the timeouts from the given client config.
    ///
    /// # Errors
    ///
    /// Returns [`GoxError::Transport`] when the TLS backend cannot be initialised.
    pub fn new(config: &ClientConfig) -> Result<Self, GoxError> {
        let client = build_reqwest_client(
            config.timeout(),
            config.connect_timeout(),
            config.use_env_proxy,
        )?;
        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and return the full response body.
    ///
    /// # Errors
    ///
    /// Returns [`GoxError::Transport`] on connection/read failures and
    /// [`GoxError::Upstream`] on a failure status.
    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Bytes, GoxError> {
        let request = self.client.get(url).headers(headers.clone());
        self.execute_reader(request).await?.read_to_end().await
    }

    /// POST `body` as JSON to `url` and return the full response body.
    ///
    /// # Errors
    ///
    /// Returns [`GoxError::InvalidRequest`] if the body cannot be serialized,
    /// [`GoxError::Transport`] on connection/read failures and
    /// [`GoxError::Upstream`] on a failure status.
    pub async fn post<B>(&self, url: &str, body: &B, headers: &HeaderMap) -> Result<Bytes, GoxError>
    where
        B: Serialize + ?Sized,
    {
        self.post_reader(url, body, headers)
            .await?
            .read_to_end()
            .await
    }

    /// POST `body` as JSON to `url` and hand back the live response body.
    ///
    /// The caller owns the returned [`ByteStream`] and must close (or drop) it.
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::post`]; on a failure status the error body is
    /// read and included in the message.
    pub async fn post_reader<B>(
        &self,
        url: &str,
        body: &B,
        headers: &HeaderMap,
    ) -> Result<ByteStream, GoxError>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(body)?;
        let mut headers = headers.clone();
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        let request = self.client.post(url).headers(headers).body(body);
        self.execute_reader(request).await
    }

    async fn execute_reader(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ByteStream, GoxError> {
        let response = request.send().await?;
        let status = response.status();
        if status_ok(status) {
            return Ok(ByteStream::from_response(response));
        }

        let body = response.bytes().await?;
        tracing::debug!(
            status = status.as_u16(),
            body_len = body.len(),
            "upstream returned failure status"
        );
        Err(upstream_error(status, &body))
    }
}
