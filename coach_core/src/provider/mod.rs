//! Streaming transports, one adapter per provider family
//!
//! - `openrouter` - OpenAI-compatible chat completions over SSE
//! - `gemini` - Google `streamGenerateContent` over SSE
//! - `http_client` - shared reqwest client construction
//!
//! Every adapter turns one prompt into a lazy stream of [`StreamEvent`]s with
//! the same shape: zero or more `TextFragment`s in provider order, then
//! exactly one terminal `Failed` or `Complete`, then nothing.

pub mod gemini;
pub mod http_client;
pub mod openrouter;

use crate::config::{Endpoints, GenerationParams};
use crate::credentials::Credential;
use crate::error::TransportError;
use crate::registry::{ModelProfile, ProviderKind};
use futures::Stream;
use std::pin::Pin;

pub use gemini::GeminiProvider;
pub use openrouter::OpenRouterProvider;

/// Events produced by a streaming transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental slice of the response text
    TextFragment(String),
    /// Terminal: the stream ended because of a fault
    Failed(TransportError),
    /// Terminal: the provider finished normally
    Complete,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::TextFragment(_))
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A provider that can stream a completion for one prompt.
///
/// Each call opens a fresh connection; the returned stream is not restartable.
pub trait StreamingProvider {
    fn stream(&self, prompt: String, profile: &ModelProfile, credential: &Credential) -> EventStream;
}

/// Tagged dispatch over the provider adapters, selected by
/// [`ModelProfile::provider_kind`]
#[derive(Debug, Clone)]
pub enum Provider {
    OpenRouter(OpenRouterProvider),
    Gemini(GeminiProvider),
}

impl Provider {
    pub fn for_kind(
        kind: ProviderKind,
        client: &reqwest::Client,
        endpoints: &Endpoints,
        params: &GenerationParams,
    ) -> Self {
        match kind {
            ProviderKind::OpenRouter => Provider::OpenRouter(OpenRouterProvider::new(
                client.clone(),
                &endpoints.openrouter_url,
                params.clone(),
            )),
            ProviderKind::Gemini => Provider::Gemini(GeminiProvider::new(
                client.clone(),
                &endpoints.gemini_url,
                params.clone(),
            )),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::OpenRouter(_) => ProviderKind::OpenRouter,
            Provider::Gemini(_) => ProviderKind::Gemini,
        }
    }
}

impl StreamingProvider for Provider {
    fn stream(&self, prompt: String, profile: &ModelProfile, credential: &Credential) -> EventStream {
        match self {
            Provider::OpenRouter(p) => p.stream(prompt, profile, credential),
            Provider::Gemini(p) => p.stream(prompt, profile, credential),
        }
    }
}

/// Turn a non-2xx response into a transport error, keeping a body excerpt
pub(crate) async fn status_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    TransportError::Status {
        status,
        body: crate::error::excerpt(&body, 200),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_kind_selects_matching_adapter() {
        let client = reqwest::Client::new();
        let endpoints = Endpoints::default();
        let params = GenerationParams::default();
        assert_eq!(
            Provider::for_kind(ProviderKind::OpenRouter, &client, &endpoints, &params).kind(),
            ProviderKind::OpenRouter
        );
        assert_eq!(
            Provider::for_kind(ProviderKind::Gemini, &client, &endpoints, &params).kind(),
            ProviderKind::Gemini
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(!StreamEvent::TextFragment("x".into()).is_terminal());
        assert!(StreamEvent::Complete.is_terminal());
        assert!(StreamEvent::Failed(TransportError::Stream("x".into())).is_terminal());
    }
}
