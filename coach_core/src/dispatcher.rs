//! UI dispatcher
//!
//! Owns everything the interactive thread owns: the session, the settings,
//! the selected model and mode, the control/status state. Front-ends call
//! [`Dispatcher::tick`] at a fixed cadence; each tick drains the message
//! channel without blocking and applies the events in arrival order, then
//! forwards the visible changes to a [`Renderer`].

use crate::channel::{self, EventReceiver, EventSender, Severity, UiEvent, VoiceState};
use crate::config::Config;
use crate::context::ProviderContext;
use crate::error::{ConfigurationError, UserInputError};
use crate::prompt::PromptMode;
use crate::registry::ModelProfile;
use crate::session::{ConversationEntry, ConversationStore, EntryTag, SavedConversation, Session, Speaker};
use crate::voice::{SpeechRecognizer, ToggleOutcome, VoiceCapture};
use crate::worker::{GenerationRequest, GenerationWorker};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

/// Presentation seam. Every method is called on the interactive thread.
pub trait Renderer {
    /// A finished entry was added (user input, error report)
    fn entry_added(&mut self, entry: &ConversationEntry);
    /// A live entry was opened; fragments follow
    fn entry_opened(&mut self, entry: &ConversationEntry);
    fn fragment_appended(&mut self, fragment: &str);
    fn failure_appended(&mut self, message: &str);
    fn entry_closed(&mut self, entry: &ConversationEntry);
    fn status_changed(&mut self, status: &Status);
    fn controls_changed(&mut self, enabled: bool);
    fn voice_changed(&mut self, state: VoiceState);
    /// The whole transcript was replaced (clear, import)
    fn transcript_reset(&mut self, entries: &[ConversationEntry]);
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub text: String,
    pub severity: Severity,
}

impl Status {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
        }
    }
}

pub struct Dispatcher<R: Renderer> {
    renderer: R,
    config: Config,
    config_path: Option<PathBuf>,
    store: ConversationStore,
    session: Session,
    worker: GenerationWorker,
    voice: Option<VoiceCapture>,
    sender: EventSender,
    receiver: EventReceiver,
    selected_model: String,
    mode: PromptMode,
    last_question_asked: Option<String>,
    controls_enabled: bool,
    status: Status,
    voice_state: VoiceState,
    voice_reset_at: Option<Instant>,
    voice_reset_after: Duration,
}

impl<R: Renderer> Dispatcher<R> {
    pub fn new(config: Config, context: Arc<ProviderContext>, runtime: Handle, renderer: R) -> Self {
        let (sender, receiver) = channel::channel();

        let selected_model = if context.registry.contains(&config.selected_model) {
            config.selected_model.clone()
        } else {
            if !config.selected_model.is_empty() {
                tracing::warn!(model = %config.selected_model, "Configured model unknown, using default");
            }
            context.registry.default_model().unwrap_or_default().to_string()
        };

        Self {
            renderer,
            config_path: None,
            store: ConversationStore::new(crate::config::conversations_dir()),
            session: Session::new(),
            worker: GenerationWorker::new(context, runtime, sender.clone()),
            voice: None,
            sender,
            receiver,
            mode: config.start_mode,
            voice_reset_after: config.voice.indicator_reset(),
            config,
            selected_model,
            last_question_asked: None,
            controls_enabled: true,
            status: Status::default(),
            voice_state: VoiceState::Idle,
            voice_reset_at: None,
        }
    }

    /// Persist settings to `path` after every change
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_store(mut self, store: ConversationStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_voice(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.voice = Some(VoiceCapture::new(recognizer, &self.config.voice, self.sender.clone()));
        self
    }

    /// Producer handle for additional background workers
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn context(&self) -> &ProviderContext {
        self.worker.context()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn controls_enabled(&self) -> bool {
        self.controls_enabled
    }

    pub fn is_generating(&self) -> bool {
        self.worker.is_busy() || !self.controls_enabled
    }

    pub fn mode(&self) -> PromptMode {
        self.mode
    }

    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    pub fn last_question(&self) -> Option<&str> {
        self.last_question_asked.as_deref()
    }

    pub fn voice_state(&self) -> VoiceState {
        self.voice_state
    }

    pub fn has_voice(&self) -> bool {
        self.voice.is_some()
    }

    pub fn models(&self) -> &[ModelProfile] {
        self.worker.context().registry.list()
    }

    /// Startup status naming the providers that have credentials
    pub fn announce_readiness(&mut self) {
        match self.worker.context().credentials.readiness_summary() {
            Some(summary) => self.set_status(summary, Severity::Normal),
            None => self.set_status(
                "No API keys found. Set OPENROUTER_API_KEY or GOOGLE_API_KEY.",
                Severity::Error,
            ),
        }
    }

    /// Drain the channel and apply every queued event. Never blocks.
    pub fn tick(&mut self) -> usize {
        let events = self.receiver.drain();
        let applied = events.len();
        for event in events {
            self.apply(event);
        }

        if let Some(at) = self.voice_reset_at {
            if Instant::now() >= at {
                self.voice_reset_at = None;
                self.set_voice_state(VoiceState::Idle);
            }
        }
        applied
    }

    fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::OpenEntry { speaker, tag } => {
                let entry = self.session.open_entry(speaker, tag);
                self.renderer.entry_opened(entry);
            }
            UiEvent::AppendFragment(fragment) => {
                if self.session.append_live(&fragment) {
                    self.renderer.fragment_appended(&fragment);
                } else {
                    tracing::debug!("Fragment without a live entry dropped");
                }
            }
            UiEvent::AppendFailure(message) => {
                if self.session.live_entry().is_some() {
                    self.session.fail_live(&message);
                    self.renderer.failure_appended(&message);
                } else {
                    let entry = self.session.push_error(message);
                    self.renderer.entry_added(entry);
                }
            }
            UiEvent::ReportError(message) => {
                let entry = self.session.push_error(message);
                self.renderer.entry_added(entry);
            }
            UiEvent::SetStatus { text, severity } => self.set_status(text, severity),
            UiEvent::SetControlsEnabled(enabled) => self.set_controls_enabled(enabled),
            UiEvent::RequestSubmitQuestion(text) => {
                if let Err(err) = self.submit_text(&text) {
                    tracing::warn!(error = %err, "Recognized speech not submitted");
                    self.set_status(format!("Voice input ignored: {}", err), Severity::Warning);
                }
            }
            UiEvent::SetVoiceIndicator(state) => {
                self.voice_reset_at = state
                    .is_result()
                    .then(|| Instant::now() + self.voice_reset_after);
                self.set_voice_state(state);
            }
        }
    }

    fn set_status(&mut self, text: impl Into<String>, severity: Severity) {
        self.status = Status::new(text, severity);
        self.renderer.status_changed(&self.status);
    }

    fn set_voice_state(&mut self, state: VoiceState) {
        self.voice_state = state;
        self.renderer.voice_changed(state);
    }

    fn set_controls_enabled(&mut self, enabled: bool) {
        if enabled {
            if let Some(entry) = self.session.close_live() {
                self.renderer.entry_closed(entry);
            }
            self.controls_enabled = true;
            self.renderer.controls_changed(true);
            // a failure status from the run that just ended stays visible
            if self.status.severity != Severity::Error {
                self.set_status(format!("Ready ({})", self.selected_model), Severity::Normal);
            }
        } else {
            self.controls_enabled = false;
            self.renderer.controls_changed(false);
            self.set_status(format!("Generating with {}...", self.selected_model), Severity::Normal);
        }
    }

    /// Submit typed or recognised text in the current mode.
    ///
    /// In ask mode the text is a new question; in evaluation mode it is the
    /// answer to the last question asked. Controls are disabled before this
    /// returns, so a second submission is rejected until the worker finishes.
    pub fn submit_text(&mut self, text: &str) -> Result<(), UserInputError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(UserInputError::EmptySubmission);
        }
        if !self.controls_enabled {
            return Err(UserInputError::Busy);
        }

        let request = GenerationRequest {
            model_name: self.selected_model.clone(),
            mode: self.mode,
            persona_context: self.config.personal_context.clone(),
            company_context: Some(self.config.company_context.clone()).filter(|c| !c.trim().is_empty()),
            question: match self.mode {
                PromptMode::Ask => text.to_string(),
                PromptMode::Evaluate => self.last_question_asked.clone().unwrap_or_default(),
            },
            answer: (self.mode == PromptMode::Evaluate).then(|| text.to_string()),
        };
        self.worker.submit(request)?;

        let tag = match self.mode {
            PromptMode::Ask => EntryTag::Ask,
            PromptMode::Evaluate => EntryTag::Evaluate,
        };
        let entry = self
            .session
            .push(ConversationEntry::new(Speaker::User, text, tag));
        self.renderer.entry_added(entry);
        self.set_controls_enabled(false);

        if self.mode == PromptMode::Ask {
            self.last_question_asked = Some(text.to_string());
        }
        Ok(())
    }

    /// Ask a question from the bank by zero-based index. In evaluation mode
    /// the question only becomes the pending question to answer.
    pub fn submit_predefined(&mut self, index: usize) -> Result<(), UserInputError> {
        let question = self
            .config
            .predefined_questions
            .get(index)
            .cloned()
            .ok_or(UserInputError::UnknownQuestion(index + 1))?;

        match self.mode {
            PromptMode::Ask => self.submit_text(&question),
            PromptMode::Evaluate => {
                if !self.controls_enabled {
                    return Err(UserInputError::Busy);
                }
                self.set_status(format!("Answer this question: {}", question), Severity::Normal);
                self.last_question_asked = Some(question);
                Ok(())
            }
        }
    }

    pub fn toggle_evaluation_mode(&mut self) -> PromptMode {
        self.mode = match self.mode {
            PromptMode::Ask => PromptMode::Evaluate,
            PromptMode::Evaluate => PromptMode::Ask,
        };
        let text = match (self.mode, self.last_question_asked.as_deref()) {
            (PromptMode::Evaluate, Some(question)) => {
                format!("Evaluation mode on. Answer: {}", question)
            }
            (PromptMode::Evaluate, None) => "Evaluation mode on. Ask or pick a question first.".to_string(),
            (PromptMode::Ask, _) => "Evaluation mode off".to_string(),
        };
        tracing::info!(mode = ?self.mode, "Prompt mode changed");
        self.set_status(text, Severity::Normal);
        self.mode
    }

    pub fn select_model(&mut self, display_name: &str) -> Result<(), ConfigurationError> {
        let name = self.worker.context().registry.resolve(display_name)?.display_name.clone();
        tracing::info!(model = %name, "Model selected");
        self.config.selected_model = name.clone();
        self.selected_model = name;
        self.persist();
        if self.controls_enabled {
            self.set_status(format!("Ready ({})", self.selected_model), Severity::Normal);
        }
        Ok(())
    }

    pub fn set_company_context(&mut self, text: &str) {
        self.config.company_context = text.trim().to_string();
        self.persist();
        let status = if self.config.company_context.is_empty() {
            "Company context cleared"
        } else {
            "Company context updated"
        };
        self.set_status(status, Severity::Normal);
    }

    pub fn set_personal_context(&mut self, text: &str) -> Result<(), UserInputError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(UserInputError::EmptySubmission);
        }
        self.config.personal_context = text.to_string();
        self.persist();
        self.set_status("Personal context updated", Severity::Normal);
        Ok(())
    }

    pub fn questions(&self) -> &[String] {
        &self.config.predefined_questions
    }

    /// Append to the bank and return the question's one-based number
    pub fn add_question(&mut self, text: &str) -> Result<usize, UserInputError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(UserInputError::EmptySubmission);
        }
        self.config.predefined_questions.push(text.to_string());
        self.persist();
        Ok(self.config.predefined_questions.len())
    }

    pub fn remove_question(&mut self, index: usize) -> Result<String, UserInputError> {
        if index >= self.config.predefined_questions.len() {
            return Err(UserInputError::UnknownQuestion(index + 1));
        }
        let removed = self.config.predefined_questions.remove(index);
        self.persist();
        Ok(removed)
    }

    /// Start or stop voice capture. Starting is refused while a generation
    /// is in flight; `None` means nothing changed.
    pub fn toggle_listening(&mut self) -> Option<ToggleOutcome> {
        let listening = match &self.voice {
            Some(voice) => voice.is_listening(),
            None => {
                self.set_status("Voice input is not configured", Severity::Warning);
                return None;
            }
        };
        if !listening && !self.controls_enabled {
            self.set_status("Wait for the current answer before speaking", Severity::Warning);
            return None;
        }

        let outcome = self.voice.as_ref()?.toggle();
        if outcome == ToggleOutcome::StillStopping {
            self.set_status("Previous capture is still stopping", Severity::Warning);
        }
        Some(outcome)
    }

    pub fn clear(&mut self) -> Result<(), UserInputError> {
        if !self.controls_enabled {
            return Err(UserInputError::Busy);
        }
        self.session.clear();
        self.last_question_asked = None;
        self.renderer.transcript_reset(self.session.entries());
        self.set_status(format!("Ready ({})", self.selected_model), Severity::Normal);
        Ok(())
    }

    /// Write the transcript to `path`, or to a new file in the store
    pub fn export(&mut self, path: Option<&Path>) -> Result<PathBuf> {
        if !self.controls_enabled {
            return Err(UserInputError::Busy.into());
        }
        let written = match path {
            Some(path) => {
                self.session.export(path)?;
                path.to_path_buf()
            }
            None => self.store.save(&self.session)?,
        };
        self.set_status(format!("Conversation saved to {}", written.display()), Severity::Normal);
        Ok(written)
    }

    /// Replace the transcript with a saved conversation
    pub fn import(&mut self, path: &Path) -> Result<usize> {
        if !self.controls_enabled {
            return Err(UserInputError::Busy.into());
        }
        let count = self.session.import(path)?;
        self.last_question_asked = self
            .session
            .entries()
            .iter()
            .rev()
            .find(|e| e.speaker == Speaker::User && e.tag == EntryTag::Ask)
            .map(|e| e.text.clone());
        self.renderer.transcript_reset(self.session.entries());
        self.set_status(format!("Loaded {} messages", count), Severity::Normal);
        Ok(count)
    }

    pub fn saved_conversations(&self) -> Result<Vec<SavedConversation>> {
        self.store.list()
    }

    pub fn save_config(&self) -> Result<()> {
        match &self.config_path {
            Some(path) => self
                .config
                .save_to_file(path)
                .context("Failed to save settings"),
            None => Ok(()),
        }
    }

    fn persist(&mut self) {
        if let Err(err) = self.save_config() {
            tracing::error!(error = %format!("{:#}", err), "Settings not saved");
            self.set_status("Could not save settings", Severity::Warning);
        }
    }

    /// Stop listening and write settings. Called on normal exit.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(voice) = &self.voice {
            voice.stop();
        }
        self.save_config()
    }
}
