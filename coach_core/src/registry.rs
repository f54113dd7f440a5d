//! Provider registry
//!
//! A fixed table mapping a model's display name to the remote model id, the
//! provider family that serves it and the credential that family needs. The
//! table is built once at startup and never mutated.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable holding the OpenRouter key
pub const OPENROUTER_KEY: &str = "OPENROUTER_API_KEY";
/// Environment variable holding the Google AI key
pub const GOOGLE_KEY: &str = "GOOGLE_API_KEY";

/// Provider families with a streaming adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions over SSE
    OpenRouter,
    /// Google generative language API, `streamGenerateContent`
    Gemini,
}

impl ProviderKind {
    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "OpenRouter",
            ProviderKind::Gemini => "Google AI",
        }
    }

    /// The credential key every model of this family requires
    pub fn credential_key(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => OPENROUTER_KEY,
            ProviderKind::Gemini => GOOGLE_KEY,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    pub display_name: String,
    pub provider_kind: ProviderKind,
    pub remote_model_id: String,
    pub credential_key: String,
}

impl ModelProfile {
    pub fn new(display_name: &str, provider_kind: ProviderKind, remote_model_id: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            provider_kind,
            remote_model_id: remote_model_id.to_string(),
            credential_key: provider_kind.credential_key().to_string(),
        }
    }
}

/// Ordered, immutable set of model profiles keyed by display name
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    profiles: Vec<ModelProfile>,
}

impl ModelRegistry {
    /// Build a registry, keeping the first profile for a duplicated display name
    pub fn new(profiles: Vec<ModelProfile>) -> Self {
        let mut unique: Vec<ModelProfile> = Vec::with_capacity(profiles.len());
        for profile in profiles {
            if unique.iter().any(|p| p.display_name == profile.display_name) {
                tracing::warn!(model = %profile.display_name, "Duplicate model display name ignored");
                continue;
            }
            unique.push(profile);
        }
        Self { profiles: unique }
    }

    pub fn resolve(&self, display_name: &str) -> Result<&ModelProfile, ConfigurationError> {
        self.profiles
            .iter()
            .find(|p| p.display_name == display_name)
            .ok_or_else(|| ConfigurationError::UnknownModel(display_name.to_string()))
    }

    pub fn list(&self) -> &[ModelProfile] {
        &self.profiles
    }

    /// Display name of the first model, used when nothing else is selected
    pub fn default_model(&self) -> Option<&str> {
        self.profiles.first().map(|p| p.display_name.as_str())
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.resolve(display_name).is_ok()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(vec![
            ModelProfile::new(
                "Sonoma Sky (OpenRouter)",
                ProviderKind::OpenRouter,
                "openrouter/sonoma-sky-alpha",
            ),
            ModelProfile::new(
                "Sonoma Dusk (OpenRouter)",
                ProviderKind::OpenRouter,
                "openrouter/sonoma-dusk-alpha",
            ),
            ModelProfile::new(
                "Gemini 2.0 Flash (OpenRouter)",
                ProviderKind::OpenRouter,
                "google/gemini-2.0-flash-exp:free",
            ),
            ModelProfile::new(
                "Gemini 1.5 Flash (Google AI)",
                ProviderKind::Gemini,
                "gemini-1.5-flash-latest",
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_registry_order() {
        let registry = ModelRegistry::default();
        assert_eq!(registry.list().len(), 4);
        assert_eq!(registry.default_model(), Some("Sonoma Sky (OpenRouter)"));
        assert_eq!(
            registry.list()[3].provider_kind,
            ProviderKind::Gemini
        );
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("Gemini 1.5 Flash (Google AI)").unwrap();
        assert_eq!(profile.credential_key, GOOGLE_KEY);
        assert_eq!(profile.remote_model_id, "gemini-1.5-flash-latest");

        assert_matches!(
            registry.resolve("GPT-9"),
            Err(ConfigurationError::UnknownModel(name)) if name == "GPT-9"
        );
    }

    #[test]
    fn test_duplicate_display_names_keep_first() {
        let registry = ModelRegistry::new(vec![
            ModelProfile::new("A", ProviderKind::OpenRouter, "first"),
            ModelProfile::new("A", ProviderKind::Gemini, "second"),
        ]);
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.resolve("A").unwrap().remote_model_id, "first");
    }
}
