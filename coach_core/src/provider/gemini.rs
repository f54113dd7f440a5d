//! Google AI (Gemini) streaming adapter
//!
//! Posts to `models/{id}:streamGenerateContent?alt=sse`. Every SSE item is a
//! full `GenerateContentResponse` holding the next text delta. Unlike the
//! OpenRouter adapter, an item that cannot be decoded is treated as a fault:
//! the SDK-style contract has no notion of harmless noise.

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

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER_NAME: &str = "Google AI";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Decode one streamed item into its text delta.
///
/// `Ok(None)` means a valid item without text (e.g. the final usage item).
pub fn parse_item(data: &str) -> Result<Option<String>, TransportError> {
    let item: GenerateContentResponse =
        serde_json::from_str(data).map_err(|e| TransportError::Provider {
            provider: PROVIDER_NAME.to_string(),
            message: format!("undecodable response item: {}", e),
        })?;

    if let Some(err) = item.error {
        let message = match err.status {
            Some(status) => format!("{} ({})", err.message, status),
            None => err.message,
        };
        return Err(TransportError::Provider {
            provider: PROVIDER_NAME.to_string(),
            message,
        });
    }

    if let Some(reason) = item.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(TransportError::Provider {
            provider: PROVIDER_NAME.to_string(),
            message: format!("prompt blocked: {}", reason),
        });
    }

    let text: String = item
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

/// Decode the SSE body into stream events. Exhaustion is completion.
pub fn sse_events<S, B, E>(body: S) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut items = std::pin::pin!(body.eventsource());
        while let Some(item) = items.next().await {
            let event = match item {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "Google AI stream interrupted");
                    yield StreamEvent::Failed(TransportError::Stream(err.to_string()));
                    return;
                }
            };

            match parse_item(&event.data) {
                Ok(Some(text)) => {
                    yield StreamEvent::TextFragment(text);
                }
                Ok(None) => {}
                Err(err) => {
                    yield StreamEvent::Failed(err);
                    return;
                }
            }
        }
        yield StreamEvent::Complete;
    }
}

pub fn build_request_body(prompt: &str, params: &GenerationParams) -> Value {
    json!({
        "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        "generationConfig": {
            "temperature": params.temperature,
            "maxOutputTokens": params.max_tokens,
        },
    })
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    params: GenerationParams,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, base_url: &str, params: GenerationParams) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            params,
        }
    }

    pub fn endpoint(&self, model_id: &str) -> String {
        format!("{}/models/{}:streamGenerateContent", self.base_url, model_id)
    }
}

impl StreamingProvider for GeminiProvider {
    fn stream(&self, prompt: String, profile: &ModelProfile, credential: &Credential) -> EventStream {
        let request = self
            .client
            .post(self.endpoint(&profile.remote_model_id))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", credential.expose())
            .json(&build_request_body(&prompt, &self.params));

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
