//! Message channel between background workers and the interactive thread
//!
//! Unbounded multi-producer/single-consumer FIFO of [`UiEvent`]s. Producers
//! never block; the single consumer drains it without blocking on every tick.

use crate::session::{EntryTag, Speaker};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::fmt;

/// Everything a background worker may ask of the interactive thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Start a new, empty live entry that following fragments extend
    OpenEntry { speaker: Speaker, tag: EntryTag },
    AppendFragment(String),
    /// Error text appended to the live entry, keeping what already streamed
    AppendFailure(String),
    /// Standalone error entry, used when a generation fails before streaming
    ReportError(String),
    SetStatus { text: String, severity: Severity },
    SetControlsEnabled(bool),
    /// Recognised speech, submitted through the normal gated path
    RequestSubmitQuestion(String),
    SetVoiceIndicator(VoiceState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Idle,
    Calibrating,
    Listening,
    Processing,
    Recognized,
    NoSpeech,
    TimedOut,
    Unintelligible,
    NetworkError,
    DeviceError,
}

impl VoiceState {
    /// A capture is running
    pub fn is_active(self) -> bool {
        matches!(
            self,
            VoiceState::Calibrating | VoiceState::Listening | VoiceState::Processing
        )
    }

    /// An outcome shown briefly before the indicator returns to idle
    pub fn is_result(self) -> bool {
        !self.is_active() && self != VoiceState::Idle
    }

    pub fn severity(self) -> Severity {
        match self {
            VoiceState::NoSpeech | VoiceState::TimedOut | VoiceState::Processing => Severity::Warning,
            VoiceState::Unintelligible | VoiceState::NetworkError | VoiceState::DeviceError => {
                Severity::Error
            }
            _ => Severity::Normal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VoiceState::Idle => "Ready",
            VoiceState::Calibrating => "Calibrating...",
            VoiceState::Listening => "Listening...",
            VoiceState::Processing => "Processing...",
            VoiceState::Recognized => "Recognized",
            VoiceState::NoSpeech => "No speech",
            VoiceState::TimedOut => "Timed out",
            VoiceState::Unintelligible => "Could not understand",
            VoiceState::NetworkError => "Network error",
            VoiceState::DeviceError => "Mic error",
        }
    }
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Producer half. Cheap to clone, one per worker.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: Sender<UiEvent>,
}

impl EventSender {
    /// Enqueue without blocking. A closed channel means the interactive
    /// thread is gone, so the event is dropped.
    pub fn send(&self, event: UiEvent) {
        if self.inner.send(event).is_err() {
            tracing::debug!("UI channel closed, event dropped");
        }
    }

    pub fn status(&self, text: impl Into<String>, severity: Severity) {
        self.send(UiEvent::SetStatus {
            text: text.into(),
            severity,
        });
    }
}

/// Consumer half, owned by the interactive thread
#[derive(Debug)]
pub struct EventReceiver {
    inner: Receiver<UiEvent>,
}

impl EventReceiver {
    /// Pop everything queued right now, in arrival order
    pub fn drain(&self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        loop {
            match self.inner.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = unbounded();
    (EventSender { inner: tx }, EventReceiver { inner: rx })
}
