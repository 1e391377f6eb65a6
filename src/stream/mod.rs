//! Streaming pipeline: line scanning, think-marker injection and paced
//! delivery to a caller-supplied sink.
//!
//! The producer reads the upstream body and pushes marked-up text fragments
//! into a capacity-1 queue; the pacer drains it on a fixed tick. Both run in
//! the calling task and share only the queue and a [`Completion`].

pub mod pacer;
pub mod sse;
pub mod think;

pub use pacer::{cut_len, pace, Completion, PaceStats};
pub use sse::{decode_event_line, EventLine, Fragment, LineScanner};
pub use think::{ThinkState, THINK_END, THINK_START};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::error::GoxError;
use crate::transport::ByteStream;

enum Interrupt {
    Cancelled,
    ConsumerDone,
}

/// Producer side of the pipeline.
///
/// Runs until `[DONE]`, end of stream, cancellation or the pacer finishing on
/// its own. The scanner is closed on every exit path and `fragments` is
/// dropped on return so the pacer sees end of input.
///
/// # Errors
///
/// Returns the scanner's read error. Cancellation is recorded in
/// `completion`, not returned.
pub async fn produce(
    scanner: &mut LineScanner,
    fragments: mpsc::Sender<String>,
    completion: &Completion,
    cancel: &CancellationToken,
) -> Result<(), GoxError> {
    let mut think = ThinkState::default();

    let interrupt = loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break Some(Interrupt::Cancelled),
            () = completion.finished() => break Some(Interrupt::ConsumerDone),
            line = scanner.next_line() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                scanner.close();
                tracing::debug!(error = %err, "stream read failed");
                return Err(err);
            }
            None => break None,
        };

        let fragment = match decode_event_line(&line, think.inspects_reasoning()) {
            EventLine::Skip => continue,
            EventLine::Done => break None,
            EventLine::Fragment(fragment) => fragment,
        };
        let text = think.apply(fragment);
        if text.is_empty() {
            continue;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break Some(Interrupt::Cancelled),
            () = completion.finished() => break Some(Interrupt::ConsumerDone),
            sent = fragments.send(text) => {
                if sent.is_err() {
                    break Some(Interrupt::ConsumerDone);
                }
            }
        }
    };

    scanner.close();
    if let Some(Interrupt::Cancelled) = interrupt {
        completion.finish(Err(GoxError::Cancelled));
    }
    Ok(())
}

/// Drive `stream` through the producer and the pacer until one terminal
/// result is known.
///
/// The pacer's recorded error wins; a read error from the producer is only
/// reported once everything it produced has been delivered.
///
/// # Errors
///
/// [`GoxError::Cancelled`] when `cancel` fires, the sink's own error, a
/// [`GoxError::Internal`] for a recovered sink panic, or the read error.
pub async fn run_pipeline<F>(
    stream: ByteStream,
    cancel: &CancellationToken,
    config: StreamConfig,
    sink: &mut F,
) -> Result<PaceStats, GoxError>
where
    F: FnMut(&[u8]) -> Result<(), GoxError>,
{
    let mut scanner = LineScanner::new(stream);
    let completion = Completion::new();
    let (tx, rx) = mpsc::channel(1);

    let (produced, stats) = tokio::join!(
        produce(&mut scanner, tx, &completion, cancel),
        pace(rx, &completion, cancel, config, sink),
    );

    match completion.take() {
        Some(Err(err)) => Err(err),
        _ => produced.map(|()| stats),
    }
}
