use std::panic::AssertUnwindSafe;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::error::{panic_message, GoxError};

/// Single-write terminal result shared by the producer and the pacer.
///
/// The first call to [`Completion::finish`] wins; later writes are dropped.
pub struct Completion {
    result: Mutex<Option<Result<(), GoxError>>>,
    written: CancellationToken,
}

impl Completion {
    #[must_use]
    pub fn new() -> Self {
        Self {
            result: Mutex::new(None),
            written: CancellationToken::new(),
        }
    }

    /// Record `result` unless something was recorded already.
    /// Returns whether this call was the one that wrote.
    pub fn finish(&self, result: Result<(), GoxError>) -> bool {
        let mut slot = self.result.lock();
        if self.written.is_cancelled() {
            return false;
        }
        *slot = Some(result);
        self.written.cancel();
        true
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.written.is_cancelled()
    }

    /// Resolves once a result has been recorded.
    pub async fn finished(&self) {
        self.written.cancelled().await;
    }

    /// Take the recorded result. The slot stays closed to further writes.
    pub fn take(&self) -> Option<Result<(), GoxError>> {
        self.result.lock().take()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of bytes to release from `buffer` on this tick.
///
/// At most `cap` bytes, except when the backlog already exceeds the cap: then
/// a quarter of the excess is added so a lagging consumer catches up without
/// one huge write. The result is shrunk to the longest prefix that is valid
/// UTF-8, so a multi-byte character is never split. A leading character
/// wider than the cut is released whole, so a small cap still makes progress;
/// `0` only means the buffer ends in the middle of its first character.
#[must_use]
pub fn cut_len(buffer: &[u8], cap: usize) -> usize {
    let len = buffer.len();
    let cut = if len > cap {
        cap + (len - cap) / 4
    } else {
        len
    };
    let valid = match std::str::from_utf8(&buffer[..cut]) {
        Ok(_) => cut,
        Err(e) => e.valid_up_to(),
    };
    if valid == 0 {
        first_char_len(buffer)
    } else {
        valid
    }
}

/// Byte width of the first character of `buffer` if it is complete.
fn first_char_len(buffer: &[u8]) -> usize {
    let head = &buffer[..buffer.len().min(4)];
    let valid = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default(),
    };
    valid.chars().next().map_or(0, char::len_utf8)
}

/// Totals of what the pacer delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaceStats {
    pub chunks: usize,
    pub bytes: usize,
}

fn dispatch<F>(sink: &mut F, chunk: &[u8]) -> Result<(), GoxError>
where
    F: FnMut(&[u8]) -> Result<(), GoxError>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(|| sink(chunk))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(panic = %message, "stream sink panicked");
            Err(GoxError::Internal(format!("stream sink panicked: {message}")))
        }
    }
}

/// Consumer side of the pipeline.
///
/// Appends every fragment received on `fragments` to a private buffer and, on
/// each tick, hands a UTF-8-safe prefix of it to `sink`. Ends by writing the
/// outcome to `completion`: `Ok(())` once input has ended and the buffer is
/// drained, the sink's error, a recovered panic, or [`GoxError::Cancelled`].
pub async fn pace<F>(
    mut fragments: mpsc::Receiver<String>,
    completion: &Completion,
    cancel: &CancellationToken,
    config: StreamConfig,
    sink: &mut F,
) -> PaceStats
where
    F: FnMut(&[u8]) -> Result<(), GoxError>,
{
    let period = config.interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut buffer = BytesMut::with_capacity(config.chunk_cap);
    let mut input_done = false;
    let mut stats = PaceStats::default();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                completion.finish(Err(GoxError::Cancelled));
                return stats;
            }
            fragment = fragments.recv(), if !input_done => match fragment {
                Some(text) => buffer.extend_from_slice(text.as_bytes()),
                None => input_done = true,
            },
            _ = ticker.tick() => {
                if buffer.is_empty() {
                    if input_done {
                        completion.finish(Ok(()));
                        return stats;
                    }
                    continue;
                }

                let cut = cut_len(&buffer, config.chunk_cap);
                if cut == 0 {
                    continue;
                }
                let chunk = buffer.split_to(cut).freeze();
                if let Err(err) = dispatch(sink, &chunk) {
                    tracing::debug!(error = %err, delivered = stats.chunks, "stream sink failed");
                    completion.finish(Err(err));
                    return stats;
                }
                stats.chunks += 1;
                stats.bytes += chunk.len();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(chunk_cap: usize) -> StreamConfig {
        StreamConfig {
            chunk_cap,
            interval_ms: 2,
        }
    }

    // -- cut_len --

    #[test]
    fn test_cut_len_under_cap_takes_everything() {
        assert_eq!(cut_len(b"hello", 64), 5);
        assert_eq!(cut_len(b"", 64), 0);
    }

    #[test]
    fn test_cut_len_backlog_growth() {
        let buffer = vec![b'a'; 64 + 40];
        assert_eq!(cut_len(&buffer, 64), 64 + 10);
        let buffer = vec![b'a'; 65];
        assert_eq!(cut_len(&buffer, 64), 64);
    }

    #[test]
    fn test_cut_len_never_splits_codepoint() {
        // "é" is two bytes; a cap of 3 would land inside the second one.
        let text = "aéé";
        assert_eq!(cut_len(text.as_bytes(), 2), 1);
        assert_eq!(cut_len(text.as_bytes(), 3), 3);
    }

    #[test]
    fn test_cut_len_incomplete_prefix_waits() {
        let emoji = "😀".as_bytes();
        assert_eq!(cut_len(&emoji[..2], 64), 0);
        assert_eq!(cut_len(&emoji[..3], 1), 0);
    }

    #[test]
    fn test_cut_len_releases_wide_first_char_under_small_cap() {
        let emoji = "😀".as_bytes();
        assert_eq!(cut_len(emoji, 1), 4);
        assert_eq!(cut_len("😀b".as_bytes(), 2), 4);
        assert_eq!(cut_len("éa".as_bytes(), 1), 2);
        assert_eq!(cut_len("ab".as_bytes(), 0), 1);
    }

    #[test]
    fn test_cut_len_prefix_is_always_valid_utf8() {
        let text = "héllo wörld ✓ 日本語テキスト 😀😀 mixed ascii";
        let bytes = text.as_bytes();
        for cap in 1..=bytes.len() + 2 {
            for end in 0..=bytes.len() {
                let cut = cut_len(&bytes[..end], cap);
                assert!(cut <= end);
                assert!(std::str::from_utf8(&bytes[..cut]).is_ok());
            }
        }
    }

    // -- Completion --

    #[test]
    fn test_completion_first_writer_wins() {
        let completion = Completion::new();
        assert!(!completion.is_finished());
        assert!(completion.finish(Err(GoxError::Sink("first".into()))));
        assert!(!completion.finish(Err(GoxError::Cancelled)));
        assert!(!completion.finish(Ok(())));
        assert!(completion.is_finished());
        let result = completion.take().unwrap();
        assert!(matches!(result, Err(GoxError::Sink(ref m)) if m == "first"));
        assert!(!completion.finish(Ok(())));
        assert!(completion.take().is_none());
    }

    #[tokio::test]
    async fn test_completion_finished_resolves_after_write() {
        let completion = Completion::new();
        completion.finish(Ok(()));
        completion.finished().await;
        assert!(matches!(completion.take(), Some(Ok(()))));
    }

    // -- pace --

    #[tokio::test]
    async fn test_pace_delivers_in_order_and_finishes() {
        let (tx, rx) = mpsc::channel(1);
        let completion = Completion::new();
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        let mut sink = |chunk: &[u8]| -> Result<(), GoxError> {
            out.extend_from_slice(chunk);
            Ok(())
        };

        let producer = async move {
            for part in ["alpha ", "beta ", "gamma"] {
                tx.send(part.to_string()).await.unwrap();
            }
        };
        let (_, stats) = tokio::join!(
            producer,
            pace(rx, &completion, &cancel, fast_config(4), &mut sink)
        );

        assert_eq!(String::from_utf8(out).unwrap(), "alpha beta gamma");
        assert_eq!(stats.bytes, "alpha beta gamma".len());
        assert!(stats.chunks >= 3);
        assert!(matches!(completion.take(), Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_pace_chunks_respect_utf8_boundaries() {
        let (tx, rx) = mpsc::channel(1);
        let completion = Completion::new();
        let cancel = CancellationToken::new();
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut sink = |chunk: &[u8]| -> Result<(), GoxError> {
            chunks.push(chunk.to_vec());
            Ok(())
        };

        let text = "日本語😀é".repeat(5);
        let expected = text.clone();
        let producer = async move {
            tx.send(text).await.unwrap();
        };
        tokio::join!(
            producer,
            pace(rx, &completion, &cancel, fast_config(5), &mut sink)
        );

        for chunk in &chunks {
            assert!(std::str::from_utf8(chunk).is_ok());
        }
        assert_eq!(chunks.concat(), expected.into_bytes());
    }

    #[tokio::test]
    async fn test_pace_small_cap_drains_multibyte_text() {
        let (tx, rx) = mpsc::channel(1);
        let completion = Completion::new();
        let cancel = CancellationToken::new();
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut sink = |chunk: &[u8]| -> Result<(), GoxError> {
            chunks.push(chunk.to_vec());
            Ok(())
        };

        let producer = async move {
            tx.send("a😀b".to_string()).await.unwrap();
        };
        let run = async {
            tokio::join!(
                producer,
                pace(rx, &completion, &cancel, fast_config(2), &mut sink)
            )
        };
        tokio::time::timeout(std::time::Duration::from_secs(2), run)
            .await
            .expect("pacer finished");

        assert_eq!(
            chunks,
            vec![b"a".to_vec(), "😀".as_bytes().to_vec(), b"b".to_vec()]
        );
        assert!(matches!(completion.take(), Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_pace_zero_interval_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        let completion = Completion::new();
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        let mut sink = |chunk: &[u8]| -> Result<(), GoxError> {
            out.extend_from_slice(chunk);
            Ok(())
        };
        let config = StreamConfig {
            chunk_cap: 0,
            interval_ms: 0,
        };

        let producer = async move {
            tx.send("héllo".to_string()).await.unwrap();
        };
        tokio::join!(producer, pace(rx, &completion, &cancel, config, &mut sink));

        assert_eq!(out, "héllo".as_bytes());
        assert!(matches!(completion.take(), Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_pace_stops_on_sink_error() {
        let (tx, rx) = mpsc::channel(1);
        let completion = Completion::new();
        let cancel = CancellationToken::new();
        let mut calls = 0usize;
        let mut sink = |_: &[u8]| -> Result<(), GoxError> {
            calls += 1;
            if calls == 2 {
                return Err(GoxError::Sink("stop at 2".into()));
            }
            Ok(())
        };

        let producer = async move {
            for _ in 0..10 {
                if tx.send("0123456789".to_string()).await.is_err() {
                    break;
                }
            }
        };
        let (_, stats) = tokio::join!(
            producer,
            pace(rx, &completion, &cancel, fast_config(4), &mut sink)
        );

        assert_eq!(calls, 2);
        assert_eq!(stats.chunks, 1);
        let result = completion.take().unwrap();
        assert!(matches!(result, Err(GoxError::Sink(ref m)) if m == "stop at 2"));
    }

    #[tokio::test]
    async fn test_pace_recovers_sink_panic() {
        let (tx, rx) = mpsc::channel(1);
        let completion = Completion::new();
        let cancel = CancellationToken::new();
        let mut sink = |_: &[u8]| -> Result<(), GoxError> { panic!("sink exploded") };

        let producer = async move {
            let _ = tx.send("boom".to_string()).await;
        };
        tokio::join!(
            producer,
            pace(rx, &completion, &cancel, fast_config(64), &mut sink)
        );

        let result = completion.take().unwrap();
        assert!(matches!(result, Err(GoxError::Internal(ref m)) if m.contains("sink exploded")));
    }

    #[tokio::test]
    async fn test_pace_cancelled() {
        let (_tx, rx) = mpsc::channel::<String>(1);
        let completion = Completion::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = |_: &[u8]| -> Result<(), GoxError> { Ok(()) };

        let stats = pace(rx, &completion, &cancel, fast_config(64), &mut sink).await;
        assert_eq!(stats, PaceStats::default());
        assert!(matches!(completion.take(), Some(Err(GoxError::Cancelled))));
    }
}
