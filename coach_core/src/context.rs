//! Immutable per-process provider context
//!
//! Built once at startup from the registry, the environment credentials and
//! the persisted endpoint/generation settings, then shared by `Arc` with every
//! generation worker. Nothing here changes after construction.

use crate::config::{Config, Endpoints, GenerationParams};
use crate::credentials::Credentials;
use crate::provider::http_client::{create_streaming_client, StreamingClientConfig};
use crate::provider::Provider;
use crate::registry::{ModelProfile, ModelRegistry};

#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub registry: ModelRegistry,
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub generation: GenerationParams,
    client: reqwest::Client,
}

impl ProviderContext {
    pub fn new(
        registry: ModelRegistry,
        credentials: Credentials,
        endpoints: Endpoints,
        generation: GenerationParams,
    ) -> Result<Self, reqwest::Error> {
        let client = create_streaming_client(&StreamingClientConfig::default())?;
        Ok(Self {
            registry,
            credentials,
            endpoints,
            generation,
            client,
        })
    }

    /// Default registry, credentials from the environment, settings from `config`
    pub fn from_env(config: &Config) -> Result<Self, reqwest::Error> {
        let registry = ModelRegistry::default();
        let credentials = Credentials::from_env(&registry);
        Self::new(
            registry,
            credentials,
            config.endpoints.clone(),
            config.generation.clone(),
        )
    }

    pub fn provider_for(&self, profile: &ModelProfile) -> Provider {
        Provider::for_kind(
            profile.provider_kind,
            &self.client,
            &self.endpoints,
            &self.generation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderKind;

    #[test]
    fn test_provider_follows_profile_kind() {
        let context = ProviderContext::new(
            ModelRegistry::default(),
            Credentials::default(),
            Endpoints::default(),
            GenerationParams::default(),
        )
        .unwrap();

        for profile in context.registry.list() {
            assert_eq!(context.provider_for(profile).kind(), profile.provider_kind);
        }
        let gemini = context.registry.resolve("Gemini 1.5 Flash (Google AI)").unwrap();
        assert_eq!(context.provider_for(gemini).kind(), ProviderKind::Gemini);
    }
}
