//! OpenRouter streaming adapter
//!
//! Speaks the OpenAI-compatible chat completions protocol:
//! - the request sets `stream: true`
//! - the body is Server-Sent Events, one JSON chunk per `data:` line
//! - each chunk carries `choices[0].delta.content`
//! - `data: [DONE]` ends the stream normally
//!
//! Unparseable chunks are skipped. Formatting noise on a healthy stream must
//! not end it, so only transport failures and in-band error objects do.

use super::{status_error, EventStream, StreamEvent, StreamingProvider};
use crate::config::GenerationParams;
use crate::credentials::Credential;
use crate::error::TransportError;
use crate::registry::ModelProfile;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Display;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<Value>,
}

/// What a single SSE `data:` payload means for the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Text(String),
    /// Valid chunk without text (role header, finish reason, usage)
    Empty,
    Done,
    Malformed,
    Error(String),
}

pub fn parse_chunk(data: &str) -> ChunkOutcome {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return ChunkOutcome::Done;
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(_) => return ChunkOutcome::Malformed,
    };

    if let Some(err) = chunk.error {
        let message = match err.code {
            Some(code) => format!("{} (code {})", err.message, code),
            None => err.message,
        };
        return ChunkOutcome::Error(message);
    }

    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
    {
        Some(text) if !text.is_empty() => ChunkOutcome::Text(text),
        _ => ChunkOutcome::Empty,
    }
}

/// Decode an SSE byte stream into stream events.
///
/// Chunk boundaries of `body` are irrelevant: events are reassembled from
/// arbitrary byte slices before parsing. A body that ends without the
/// sentinel is still a normal completion.
pub fn sse_events<S, B, E>(body: S) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut events = std::pin::pin!(body.eventsource());
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "OpenRouter stream interrupted");
                    yield StreamEvent::Failed(TransportError::Stream(err.to_string()));
                    return;
                }
            };

            match parse_chunk(&event.data) {
                ChunkOutcome::Text(text) => {
                    yield StreamEvent::TextFragment(text);
                }
                ChunkOutcome::Empty => {}
                ChunkOutcome::Done => {
                    yield StreamEvent::Complete;
                    return;
                }
                ChunkOutcome::Malformed => {
                    tracing::debug!(payload = %event.data, "Skipping malformed stream chunk");
                }
                ChunkOutcome::Error(message) => {
                    yield StreamEvent::Failed(TransportError::Provider {
                        provider: "OpenRouter".to_string(),
                        message,
                    });
                    return;
                }
            }
        }
        tracing::debug!("OpenRouter stream ended without sentinel");
        yield StreamEvent::Complete;
    }
}

pub fn build_request_body(model: &str, prompt: &str, params: &GenerationParams) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "stream": true,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
    })
}

#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
    client: reqwest::Client,
    base_url: String,
    params: GenerationParams,
}

impl OpenRouterProvider {
    pub fn new(client: reqwest::Client, base_url: &str, params: GenerationParams) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            params,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl StreamingProvider for OpenRouterProvider {
    fn stream(&self, prompt: String, profile: &ModelProfile, credential: &Credential) -> EventStream {
        let body = build_request_body(&profile.remote_model_id, &prompt, &self.params);
        let request = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential.expose())
            .json(&body);

        Box::pin(async_stream::stream! {
            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    yield StreamEvent::Failed(TransportError::Connect(err.to_string()));
                    return;
                }
            };

            if !response.status().is_success() {
                yield StreamEvent::Failed(status_error(response).await);
                return;
            }

            let mut events = std::pin::pin!(sse_events(response.bytes_stream()));
            while let Some(event) = events.next().await {
                yield event;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;

    fn sse(payloads: &[&str]) -> String {
        payloads.iter().map(|p| format!("data: {}\n\n", p)).collect()
    }

    fn content_chunk(text: &str) -> String {
        json!({"choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]}).to_string()
    }

    async fn collect_split(body: String, split: usize) -> Vec<StreamEvent> {
        let pieces: Vec<Result<Vec<u8>, std::io::Error>> = body
            .into_bytes()
            .chunks(split)
            .map(|c| Ok(c.to_vec()))
            .collect();
        sse_events(stream::iter(pieces)).collect().await
    }

    #[test]
    fn test_parse_chunk_variants() {
        assert_eq!(parse_chunk("[DONE]"), ChunkOutcome::Done);
        assert_eq!(parse_chunk(&content_chunk("Hi")), ChunkOutcome::Text("Hi".into()));
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            ChunkOutcome::Empty
        );
        assert_eq!(parse_chunk("{not json"), ChunkOutcome::Malformed);
        assert_eq!(
            parse_chunk(r#"{"error":{"message":"Rate limited","code":429}}"#),
            ChunkOutcome::Error("Rate limited (code 429)".into())
        );
    }

    #[tokio::test]
    async fn test_fragments_then_complete_at_any_granularity() {
        let a = content_chunk("I ");
        let b = content_chunk("focus on ");
        let c = content_chunk("growth.");
        let body = sse(&[&a, &b, &c, "[DONE]"]);

        for split in [1, 3, 7, 64, body.len()] {
            let events = collect_split(body.clone(), split).await;
            assert_eq!(
                events,
                vec![
                    StreamEvent::TextFragment("I ".into()),
                    StreamEvent::TextFragment("focus on ".into()),
                    StreamEvent::TextFragment("growth.".into()),
                    StreamEvent::Complete,
                ],
                "split size {}",
                split
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_skipped() {
        let a = content_chunk("one");
        let b = content_chunk("two");
        let body = format!(": OPENROUTER PROCESSING\n\n{}", sse(&[&a, "{\"choices\": [", &b, "[DONE]"]));
        let events = collect_split(body, 5).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextFragment("one".into()),
                StreamEvent::TextFragment("two".into()),
                StreamEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_after_sentinel() {
        let a = content_chunk("kept");
        let late = content_chunk("dropped");
        let events = collect_split(sse(&[&a, "[DONE]", &late]), 16).await;
        assert_eq!(
            events,
            vec![StreamEvent::TextFragment("kept".into()), StreamEvent::Complete]
        );
    }

    #[tokio::test]
    async fn test_mid_stream_fault_ends_with_one_failure() {
        let a = content_chunk("partial");
        let pieces: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(sse(&[&a]).into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(sse(&[&content_chunk("never")]).into_bytes()),
        ];
        let events: Vec<StreamEvent> = sse_events(stream::iter(pieces)).collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::TextFragment("partial".into()));
        assert!(matches!(events[1], StreamEvent::Failed(TransportError::Stream(_))));
    }

    #[tokio::test]
    async fn test_in_band_error_is_terminal() {
        let a = content_chunk("x");
        let err = r#"{"error":{"message":"upstream overloaded"}}"#;
        let events = collect_split(sse(&[&a, err, &content_chunk("y")]), 10).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextFragment("x".into()),
                StreamEvent::Failed(TransportError::Provider {
                    provider: "OpenRouter".into(),
                    message: "upstream overloaded".into(),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_sentinel_still_completes() {
        let a = content_chunk("only");
        let events = collect_split(sse(&[&a]), 4).await;
        assert_eq!(
            events,
            vec![StreamEvent::TextFragment("only".into()), StreamEvent::Complete]
        );
    }

    #[test]
    fn test_request_body() {
        let body = build_request_body("openrouter/sonoma-sky-alpha", "Hi", &GenerationParams::default());
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hi");
    }
}
