//! HTTP plumbing shared by all adapters.

use crate::error::ProviderError;
use crate::sequencer::{ChunkSequencer, RawEvent};
use crate::sse::SseDecoder;
use crate::types::ChunkStream;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

/// Cap on how much of an error body is echoed back into an error message.
const MAX_ERROR_BODY_BYTES: usize = 2 * 1024;
/// Longest silence tolerated while waiting for headers or the next body chunk.
const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Parses one SSE payload into zero or more raw events.
pub(crate) type EventParser = fn(&str) -> Result<Vec<RawEvent>, ProviderError>;

/// A fully translated backend call.
#[derive(Debug, Clone)]
pub(crate) struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// One long-lived HTTP client per backend.
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: Client,
    provider: &'static str,
    stall_timeout: Duration,
}

impl HttpTransport {
    pub fn new(provider: &'static str) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            provider,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    fn stalled(&self) -> ProviderError {
        ProviderError::Stalled {
            provider: self.provider.to_string(),
            idle: self.stall_timeout,
        }
    }

    async fn send(&self, request: &HttpRequest) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        let response = builder.send().await?;
        check_status(self.provider, response).await
    }

    /// Single-shot call returning the decoded JSON body.
    pub async fn post_json(&self, request: &HttpRequest) -> Result<Value, ProviderError> {
        let response = self.send(request).await?;
        Ok(response.json::<Value>().await?)
    }

    /// Streaming call returning the `data:` payload of every SSE event.
    pub async fn post_sse(
        &self,
        request: &HttpRequest,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        let response = tokio::time::timeout(self.stall_timeout, self.send(request))
            .await
            .map_err(|_| self.stalled())??;
        let bytes = response.bytes_stream().boxed();
        Ok(sse_payloads(bytes, self.provider, self.stall_timeout).boxed())
    }

    /// Lazily issue `request` and turn its SSE payloads into ordered chunks.
    ///
    /// Nothing is sent until the returned stream is first polled.
    pub fn event_stream(
        &self,
        request: HttpRequest,
        parse: EventParser,
        include_thinking: bool,
    ) -> ChunkStream {
        let transport = self.clone();
        let raw = stream::once(async move { transport.post_sse(&request).await })
            .flat_map(|opened| match opened {
                Ok(payloads) => payloads,
                Err(err) => stream::iter(vec![Err(err)]).boxed(),
            })
            .flat_map(move |payload| {
                let events: Vec<Result<RawEvent, ProviderError>> =
                    match payload.and_then(|data| parse(&data)) {
                        Ok(events) => events
                            .into_iter()
                            .filter(|e| include_thinking || !matches!(e, RawEvent::Thinking(_)))
                            .map(Ok)
                            .collect(),
                        Err(err) => vec![Err(err)],
                    };
                stream::iter(events)
            });

        ChunkSequencer::new(raw).boxed()
    }
}

/// Map non-success HTTP statuses onto the error taxonomy.
async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let bytes = response.bytes().await.unwrap_or_default();
    let truncated = &bytes[..bytes.len().min(MAX_ERROR_BODY_BYTES)];
    let message = format!("HTTP {status}: {}", String::from_utf8_lossy(truncated));

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            provider: provider.to_string(),
            message,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(message),
        _ => ProviderError::Api(message),
    })
}

/// Decode a byte stream into SSE payloads, flushing a trailing event at EOF.
///
/// A gap longer than `stall` between body chunks yields
/// [`ProviderError::Stalled`] and ends the stream.
pub(crate) fn sse_payloads<S, B, E>(
    bytes: S,
    provider: &'static str,
    stall: Duration,
) -> impl Stream<Item = Result<String, ProviderError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<ProviderError>,
{
    let state = (bytes, SseDecoder::new(), VecDeque::<String>::new(), false);
    stream::unfold(state, move |(mut bytes, mut decoder, mut ready, mut ended)| async move {
        loop {
            if let Some(payload) = ready.pop_front() {
                return Some((Ok(payload), (bytes, decoder, ready, ended)));
            }
            if ended {
                return None;
            }
            match tokio::time::timeout(stall, bytes.next()).await {
                Ok(Some(Ok(chunk))) => ready.extend(decoder.push(chunk.as_ref())),
                Ok(Some(Err(err))) => {
                    return Some((Err(err.into()), (bytes, decoder, ready, true)));
                }
                Ok(None) => {
                    ended = true;
                    ready.extend(decoder.finish());
                }
                Err(_) => {
                    tracing::warn!(provider, idle = ?stall, "backend stream stalled");
                    let err = ProviderError::Stalled {
                        provider: provider.to_string(),
                        idle: stall,
                    };
                    return Some((Err(err), (bytes, decoder, VecDeque::new(), true)));
                }
            }
        }
    })
}
