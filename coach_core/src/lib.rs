//! Core of the interview coach: streaming answer generation from several
//! model providers, relayed to a single interactive thread.
//!
//! Front-ends own a [`Dispatcher`] and call [`Dispatcher::tick`] on a fixed
//! cadence; everything slow happens on background workers that only talk to
//! the interactive thread through the message [`channel`].

pub mod channel;
pub mod config;
pub mod context;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod prelude;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod session;
pub mod voice;
pub mod worker;

pub use channel::{Severity, UiEvent, VoiceState};
pub use config::Config;
pub use context::ProviderContext;
pub use dispatcher::{Dispatcher, Renderer, Status};
pub use error::{CoachError, CoachResult};
pub use provider::{StreamEvent, StreamingProvider};
