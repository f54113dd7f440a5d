//! Generation worker
//!
//! Runs one request/stream cycle on the tokio runtime, away from the
//! interactive thread, and reports every step as a [`UiEvent`]:
//!
//! ```text
//! Idle -> Building -> Streaming -> Completed
//!            |            |
//!            +------------+------> Failed
//! ```
//!
//! The worker is single-flight: [`GenerationWorker::submit`] refuses a second
//! request while one is outstanding. Whatever way a run ends, its last event
//! is `SetControlsEnabled(true)`.

use crate::channel::{EventSender, Severity, UiEvent};
use crate::context::ProviderContext;
use crate::error::UserInputError;
use crate::prompt::{self, PromptInput, PromptMode};
use crate::provider::{StreamEvent, StreamingProvider};
use crate::registry::ProviderKind;
use crate::session::{EntryTag, Speaker};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::Instrument;
use uuid::Uuid;

/// Everything one generation needs, captured on the interactive thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model_name: String,
    pub mode: PromptMode,
    pub persona_context: String,
    pub company_context: Option<String>,
    /// The question to answer, or the pending question in evaluation mode
    pub question: String,
    /// Candidate answer, evaluation mode only
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerPhase {
    #[default]
    Idle,
    Building,
    Streaming,
    Completed,
    Failed,
}

/// Clears the busy flag, then re-enables controls. Runs on every exit path,
/// including a dropped or panicking task.
struct FlightGuard {
    busy: Arc<AtomicBool>,
    events: EventSender,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        self.events.send(UiEvent::SetControlsEnabled(true));
    }
}

#[derive(Debug, Clone)]
pub struct GenerationWorker {
    context: Arc<ProviderContext>,
    runtime: Handle,
    events: EventSender,
    busy: Arc<AtomicBool>,
    phase: Arc<Mutex<WorkerPhase>>,
}

impl GenerationWorker {
    pub fn new(context: Arc<ProviderContext>, runtime: Handle, events: EventSender) -> Self {
        Self {
            context,
            runtime,
            events,
            busy: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(Mutex::new(WorkerPhase::Idle)),
        }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a generation in the background and return its id.
    ///
    /// Returns [`UserInputError::Busy`] without side effects when a previous
    /// generation has not finished.
    pub fn submit(&self, request: GenerationRequest) -> Result<Uuid, UserInputError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(model = %request.model_name, "Generation rejected, worker busy");
            return Err(UserInputError::Busy);
        }

        let generation_id = Uuid::new_v4();
        let guard = FlightGuard {
            busy: Arc::clone(&self.busy),
            events: self.events.clone(),
        };
        let run = Run {
            context: Arc::clone(&self.context),
            events: self.events.clone(),
            phase: Arc::clone(&self.phase),
        };
        let span = tracing::info_span!("generation", %generation_id, model = %request.model_name);

        self.runtime.spawn(
            async move {
                let _guard = guard;
                run.execute(request).await;
            }
            .instrument(span),
        );
        Ok(generation_id)
    }
}

struct Run {
    context: Arc<ProviderContext>,
    events: EventSender,
    phase: Arc<Mutex<WorkerPhase>>,
}

impl Run {
    fn set_phase(&self, phase: WorkerPhase) {
        tracing::debug!(?phase, "Worker phase");
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Report a failure that happened before any text streamed
    fn abort(&self, message: String) {
        tracing::warn!(error = %message, "Generation aborted before streaming");
        self.events.send(UiEvent::ReportError(message));
        self.events.status("Generation failed", Severity::Error);
        self.set_phase(WorkerPhase::Failed);
    }

    async fn execute(&self, request: GenerationRequest) {
        self.set_phase(WorkerPhase::Building);

        let profile = match self.context.registry.resolve(&request.model_name) {
            Ok(profile) => profile,
            Err(err) => return self.abort(err.to_string()),
        };
        let credential = match self.context.credentials.credential_for(profile) {
            Ok(credential) => credential,
            Err(err) => return self.abort(err.to_string()),
        };
        let input = PromptInput {
            mode: request.mode,
            persona_context: &request.persona_context,
            company_context: request.company_context.as_deref(),
            question: &request.question,
            answer: request.answer.as_deref(),
        };
        let prompt = match prompt::build(&input) {
            Ok(prompt) => prompt,
            Err(err) => return self.abort(err.to_string()),
        };

        let (speaker, tag) = match request.mode {
            PromptMode::Ask => (Speaker::Assistant, EntryTag::Ask),
            PromptMode::Evaluate => (Speaker::AssistantEvaluation, EntryTag::Evaluate),
        };
        self.events.send(UiEvent::OpenEntry { speaker, tag });
        self.set_phase(WorkerPhase::Streaming);
        tracing::info!(provider = %profile.provider_kind, prompt_chars = prompt.len(), "Streaming started");

        let provider = self.context.provider_for(profile);
        let mut stream = provider.stream(prompt, profile, credential);
        let mut fragments = 0usize;

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::TextFragment(text) => {
                    fragments += 1;
                    self.events.send(UiEvent::AppendFragment(text));
                }
                StreamEvent::Failed(err) => {
                    tracing::error!(error = %err, fragments, "Stream failed");
                    self.events.send(UiEvent::AppendFailure(err.to_string()));
                    self.events
                        .status(failure_status(profile.provider_kind), Severity::Error);
                    self.set_phase(WorkerPhase::Failed);
                    return;
                }
                StreamEvent::Complete => break,
            }
        }

        tracing::info!(fragments, "Streaming completed");
        self.set_phase(WorkerPhase::Completed);
    }
}

fn failure_status(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenRouter => "API connection failed",
        ProviderKind::Gemini => "Google AI request failed",
    }
}
