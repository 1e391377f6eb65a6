use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::error::GoxError;

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, GoxError>> + Send>>;

/// A live, closable response body.
///
/// Closing drops the underlying body, which releases the connection. `close`
/// is idempotent: only the first call releases anything, later calls (and
/// the final drop) are no-ops.
pub struct ByteStream {
    inner: Option<ChunkStream>,
}

impl ByteStream {
    /// Wrap any chunked byte stream; read errors are reported as
    /// [`GoxError::Transport`].
    pub fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display,
    {
        let mapped = stream.map(|chunk| chunk.map_err(|e| GoxError::Transport(e.to_string())));
        Self {
            inner: Some(Box::pin(mapped)),
        }
    }

    #[must_use]
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(response.bytes_stream())
    }

    /// Next chunk of the body, or `None` once exhausted or closed.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, GoxError>> {
        let inner = self.inner.as_mut()?;
        inner.next().await
    }

    /// Release the body. Returns `true` only for the call that actually closed it.
    pub fn close(&mut self) -> bool {
        self.inner.take().is_some()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Read the remaining body into memory and close the stream.
    ///
    /// # Errors
    ///
    /// Returns [`GoxError::Transport`] when reading a chunk fails.
    pub async fn read_to_end(mut self) -> Result<Bytes, GoxError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
            out.extend_from_slice(&chunk?);
        }
        self.close();
        Ok(out.freeze())
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}
