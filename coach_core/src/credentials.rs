//! Credential resolver
//!
//! Secrets are read from the process environment exactly once, when the
//! [`Credentials`] value is built. Lookups afterwards never touch the
//! environment again.

use crate::error::ConfigurationError;
use crate::registry::{ModelProfile, ModelRegistry, ProviderKind};
use std::collections::HashMap;
use std::fmt;

/// Opaque API secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    secrets: HashMap<String, Credential>,
}

impl Credentials {
    /// Read every credential key the registry mentions from the environment.
    /// Empty values count as missing.
    pub fn from_env(registry: &ModelRegistry) -> Self {
        Self::from_lookup(registry, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(registry: &ModelRegistry, mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut secrets = HashMap::new();
        for profile in registry.list() {
            if secrets.contains_key(&profile.credential_key) {
                continue;
            }
            match lookup(&profile.credential_key) {
                Some(value) if !value.trim().is_empty() => {
                    secrets.insert(profile.credential_key.clone(), Credential::new(value.trim()));
                }
                _ => {
                    tracing::info!(key = %profile.credential_key, "Credential not set");
                }
            }
        }
        Self { secrets }
    }

    pub fn with(mut self, key: &str, secret: &str) -> Self {
        self.secrets.insert(key.to_string(), Credential::new(secret));
        self
    }

    pub fn credential_for(&self, profile: &ModelProfile) -> Result<&Credential, ConfigurationError> {
        self.secrets
            .get(&profile.credential_key)
            .ok_or_else(|| ConfigurationError::MissingCredential {
                key: profile.credential_key.clone(),
            })
    }

    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.secrets.contains_key(kind.credential_key())
    }

    /// Startup summary such as "OpenRouter ready & Google AI ready"
    pub fn readiness_summary(&self) -> Option<String> {
        let ready: Vec<String> = [ProviderKind::OpenRouter, ProviderKind::Gemini]
            .into_iter()
            .filter(|kind| self.has_provider(*kind))
            .map(|kind| format!("{} ready", kind.label()))
            .collect();
        if ready.is_empty() {
            None
        } else {
            Some(ready.join(" & "))
        }
    }
}
