//! Commonly used types for front-ends
//!
//! ```rust
//! use coach_core::prelude::*;
//! ```

// Errors
pub use crate::error::{
    CoachError, CoachResult, ConfigurationError, RecognitionError, TransportError, UserInputError,
};

// Settings and shared context
pub use crate::config::{Config, VoiceConfig};
pub use crate::context::ProviderContext;
pub use crate::credentials::Credentials;
pub use crate::registry::{ModelProfile, ModelRegistry, ProviderKind};

// Interactive thread
pub use crate::channel::{Severity, UiEvent, VoiceState};
pub use crate::dispatcher::{Dispatcher, Renderer, Status};
pub use crate::prompt::PromptMode;
pub use crate::session::{ConversationEntry, EntryTag, SavedConversation, Speaker};

// Voice
pub use crate::voice::{CommandRecognizer, SpeechRecognizer, ToggleOutcome};
