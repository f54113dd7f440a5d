//! Persisted configuration
//!
//! A JSON document under `~/.interview-coach/config.json`. Every field has a
//! default so a partial file still loads; a missing or corrupt file yields the
//! defaults. Credentials are never stored here.

use crate::prompt::PromptMode;
use crate::provider::{gemini, openrouter};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR: &str = ".interview-coach";

pub const DEFAULT_PERSONAL_CONTEXT: &str = "\
My name is Alex Rivera, a web developer and designer who works where clean engineering meets user-centric design.

Core Philosophy & Skills:
I follow a 'less is more' design philosophy: minimalism, clarity, and a mobile-first approach. My main stack is Next.js with the App Router, TypeScript, and Tailwind CSS, and I care about performance, accessibility, and SEO.

Experience Highlights:
- Web development internship building and optimising client websites.
- UI/UX design work for a student developer community.
- Security internship covering Linux administration and vulnerability assessment.

Career Goals:
I want to grow into a senior developer who builds exceptional user interfaces, ideally in the gaming industry.";

pub fn default_questions() -> Vec<String> {
    [
        "What are your weaknesses?",
        "Describe a time you had a significant disagreement with a colleague.",
        "Tell me about the most complex technical challenge you faced on a project.",
        "How would you handle a client who insists on a feature that hurts performance?",
        "What is your process for deciding whether to switch technologies mid-project?",
        "What are your immediate steps if you discover a security vulnerability?",
        "How do you balance minimalist design with a client's business goals for more ads?",
    ]
    .iter()
    .map(|q| q.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub personal_context: String,
    pub predefined_questions: Vec<String>,
    pub company_context: String,
    /// Display name of the selected model; empty means registry default
    pub selected_model: String,
    pub start_mode: PromptMode,
    pub endpoints: Endpoints,
    pub generation: GenerationParams,
    pub voice: VoiceConfig,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            personal_context: DEFAULT_PERSONAL_CONTEXT.to_string(),
            predefined_questions: default_questions(),
            company_context: String::new(),
            selected_model: String::new(),
            start_mode: PromptMode::Ask,
            endpoints: Endpoints::default(),
            generation: GenerationParams::default(),
            voice: VoiceConfig::default(),
            poll_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub openrouter_url: String,
    pub gemini_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openrouter_url: openrouter::DEFAULT_BASE_URL.to_string(),
            gemini_url: gemini::DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// External transcription command, program first. Empty disables voice.
    pub command: Vec<String>,
    pub listen_timeout_secs: u64,
    pub phrase_time_limit_secs: u64,
    /// Extra time the command gets to transcribe after recording ends
    pub transcribe_timeout_secs: u64,
    /// How long a result stays on the voice indicator
    pub indicator_reset_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            listen_timeout_secs: 10,
            phrase_time_limit_secs: 30,
            transcribe_timeout_secs: 15,
            indicator_reset_ms: 2000,
        }
    }
}

impl VoiceConfig {
    pub fn is_configured(&self) -> bool {
        self.command.first().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout_secs)
    }

    pub fn phrase_time_limit(&self) -> Duration {
        Duration::from_secs(self.phrase_time_limit_secs)
    }

    pub fn transcribe_timeout(&self) -> Duration {
        Duration::from_secs(self.transcribe_timeout_secs)
    }

    pub fn indicator_reset(&self) -> Duration {
        Duration::from_millis(self.indicator_reset_ms)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Load the file if it exists and parses, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %format!("{:#}", err), "Config unreadable, using defaults");
                Self::default()
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

/// `~/.interview-coach`, or `./.interview-coach` when there is no home directory
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    app_dir().join("config.json")
}

pub fn conversations_dir() -> PathBuf {
    app_dir().join("conversations")
}
