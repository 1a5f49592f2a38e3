//! Enforces chunk ordering on top of a raw backend event stream.

use crate::error::ProviderError;
use crate::types::{StreamChunk, TokenUsage};
use futures::Stream;
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

/// What an adapter extracts from one backend event, before ordering rules apply.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Content(String),
    Thinking(String),
    Usage(TokenUsage),
    /// The backend ended the generation itself; text before it still stands.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    Finished,
}

/// Turns `Result<RawEvent, ProviderError>` items into ordered [`StreamChunk`]s.
///
/// Content and thinking pass through in backend order. Usage reports are
/// merged and emitted once, after the inner stream is exhausted, followed by
/// `Done`. The first inner error becomes the only `Error` chunk and ends the
/// sequence; nothing is yielded after a terminal chunk.
#[pin_project]
pub struct ChunkSequencer<S> {
    #[pin]
    inner: S,
    usage: Option<TokenUsage>,
    pending_done: bool,
    phase: Phase,
}

impl<S> ChunkSequencer<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            usage: None,
            pending_done: false,
            phase: Phase::Streaming,
        }
    }
}

impl<S> Stream for ChunkSequencer<S>
where
    S: Stream<Item = Result<RawEvent, ProviderError>>,
{
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.phase == Phase::Finished {
            return Poll::Ready(None);
        }

        if *this.pending_done {
            *this.pending_done = false;
            *this.phase = Phase::Finished;
            return Poll::Ready(Some(StreamChunk::Done));
        }

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(RawEvent::Content(text)))) => {
                    if text.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(StreamChunk::Content { text }));
                }
                Poll::Ready(Some(Ok(RawEvent::Thinking(text)))) => {
                    if text.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(StreamChunk::Thinking { text }));
                }
                Poll::Ready(Some(Ok(RawEvent::Usage(report)))) => {
                    match this.usage.as_mut() {
                        Some(existing) => existing.merge(&report),
                        None => *this.usage = Some(report),
                    }
                }
                Poll::Ready(Some(Ok(RawEvent::Failed(message)))) => {
                    *this.phase = Phase::Finished;
                    return Poll::Ready(Some(StreamChunk::Error { message }));
                }
                Poll::Ready(Some(Err(err))) => {
                    *this.phase = Phase::Finished;
                    return Poll::Ready(Some(StreamChunk::Error {
                        message: err.to_string(),
                    }));
                }
                Poll::Ready(None) => {
                    return match this.usage.take() {
                        Some(usage) => {
                            *this.pending_done = true;
                            Poll::Ready(Some(StreamChunk::Usage { usage }))
                        }
                        None => {
                            *this.phase = Phase::Finished;
                            Poll::Ready(Some(StreamChunk::Done))
                        }
                    };
                }
            }
        }
    }
}
