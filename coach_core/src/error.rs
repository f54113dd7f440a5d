//! Centralized error handling for interview-coach
//!
//! Errors are grouped the way they are reported to the user:
//!
//! - [`ConfigurationError`] - missing credential, unconfigured model
//! - [`TransportError`] - connection or streaming failures from a provider
//! - [`RecognitionError`] - speech capture and transcription failures
//! - [`UserInputError`] - submissions the current state cannot accept
//!
//! None of these are process-fatal. Each one ends the current operation and is
//! rendered inline through the message channel. `anyhow` is used at the edges
//! (file I/O, CLI startup) for context-carrying errors.

use thiserror::Error;

/// Top-level error for core operations
#[derive(Error, Debug)]
pub enum CoachError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error(transparent)]
    UserInput(#[from] UserInputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Display name not present in the model registry
    #[error("Model '{0}' not configured.")]
    UnknownModel(String),

    /// The credential the model's provider needs is not set
    #[error("API Key Error: {key} not found in your environment. Please add it to use this model.")]
    MissingCredential { key: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("API Connection Error: {0}")]
    Connect(String),

    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream interrupted: {0}")]
    Stream(String),

    /// Error object reported in-band by the provider
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("Listening timed out")]
    TimedOut,

    #[error("Could not understand audio")]
    Unintelligible,

    #[error("Speech service error: {0}")]
    Service(String),

    #[error("Capture device error: {0}")]
    Device(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserInputError {
    #[error("Evaluation mode needs a question first. Ask a question before submitting an answer.")]
    NoPendingQuestion,

    #[error("Nothing to submit")]
    EmptySubmission,

    #[error("A response is still being generated")]
    Busy,

    #[error("There is no predefined question #{0}")]
    UnknownQuestion(usize),
}

pub type CoachResult<T> = Result<T, CoachError>;

/// Cut a response body down to something that fits on one status line
pub fn excerpt(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut)
}
