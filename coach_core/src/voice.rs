//! Voice capture
//!
//! Speech recognition is an external collaborator behind [`SpeechRecognizer`].
//! [`VoiceCapture`] runs one capture per background thread and reports its
//! progress through the message channel; recognised text comes back as a
//! `RequestSubmitQuestion` so it takes the same gated path as typed input.
//!
//! Stopping is cooperative: clearing the listening flag prevents the next
//! blocking call and discards a result that arrives afterwards, but cannot
//! interrupt a call already in progress.

use crate::channel::{EventSender, UiEvent, VoiceState};
use crate::config::VoiceConfig;
use crate::error::{excerpt, RecognitionError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Blocking speech recognition, called only from the capture thread
#[cfg_attr(test, mockall::automock)]
pub trait SpeechRecognizer: Send + Sync {
    /// Check that a capture device is usable
    fn probe(&self) -> Result<(), RecognitionError>;

    /// Adjust for ambient noise before listening
    fn calibrate(&self) -> Result<(), RecognitionError>;

    /// Wait up to `timeout` for speech to start, record at most
    /// `phrase_time_limit`, and return the transcript
    fn listen(&self, timeout: Duration, phrase_time_limit: Duration) -> Result<String, RecognitionError>;
}

/// Environment variable telling the command what to do: probe, calibrate or listen
pub const ACTION_ENV: &str = "COACH_VOICE_ACTION";
pub const TIMEOUT_ENV: &str = "COACH_LISTEN_TIMEOUT_SECS";
pub const PHRASE_LIMIT_ENV: &str = "COACH_PHRASE_LIMIT_SECS";

/// Exit status a command uses to say no speech started in time
pub const EXIT_NO_SPEECH: i32 = 2;

const PROBE_DEADLINE: Duration = Duration::from_secs(5);
const CALIBRATE_DEADLINE: Duration = Duration::from_secs(5);
const POLL_STEP: Duration = Duration::from_millis(20);
const DEFAULT_TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Recognizer backed by an external transcription command.
///
/// The command receives its action and limits through the environment and
/// prints the transcript on stdout. A listen is killed once the listen
/// timeout, the phrase limit and the transcription allowance have all passed.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
    transcribe_timeout: Duration,
}

enum CommandOutcome {
    Finished { success: bool, code: Option<i32>, stdout: String, stderr: String },
    Killed,
}

impl CommandRecognizer {
    /// `None` when the command line is empty
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            transcribe_timeout: DEFAULT_TRANSCRIBE_TIMEOUT,
        })
    }

    pub fn from_config(config: &VoiceConfig) -> Option<Self> {
        Self::new(&config.command).map(|r| r.with_transcribe_timeout(config.transcribe_timeout()))
    }

    pub fn with_transcribe_timeout(mut self, timeout: Duration) -> Self {
        self.transcribe_timeout = timeout;
        self
    }

    fn run(&self, action: &str, env: &[(&str, String)], deadline: Duration) -> Result<CommandOutcome, RecognitionError> {
        let mut expression = duct::cmd(&self.program, &self.args)
            .env(ACTION_ENV, action)
            .stdin_null()
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        for (key, value) in env {
            expression = expression.env(*key, value);
        }

        let handle = expression
            .start()
            .map_err(|e| RecognitionError::Device(format!("cannot start '{}': {}", self.program, e)))?;

        let started = Instant::now();
        loop {
            match handle.try_wait() {
                Ok(Some(output)) => {
                    return Ok(CommandOutcome::Finished {
                        success: output.status.success(),
                        code: output.status.code(),
                        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                Ok(None) if started.elapsed() >= deadline => {
                    tracing::warn!(action, ?deadline, "Speech command over deadline, killing it");
                    if let Err(err) = handle.kill() {
                        tracing::warn!(error = %err, "Failed to kill speech command");
                    }
                    return Ok(CommandOutcome::Killed);
                }
                Ok(None) => thread::sleep(POLL_STEP),
                Err(err) => return Err(RecognitionError::Service(err.to_string())),
            }
        }
    }

    /// probe and calibrate: any failure means the device is unusable
    fn run_device_check(&self, action: &str, deadline: Duration) -> Result<(), RecognitionError> {
        match self.run(action, &[], deadline)? {
            CommandOutcome::Finished { success: true, .. } => Ok(()),
            CommandOutcome::Finished { stderr, code, .. } => Err(RecognitionError::Device(
                if stderr.is_empty() {
                    format!("{} exited with {:?}", action, code)
                } else {
                    excerpt(&stderr, 160)
                },
            )),
            CommandOutcome::Killed => Err(RecognitionError::Device(format!("{} did not finish", action))),
        }
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn probe(&self) -> Result<(), RecognitionError> {
        self.run_device_check("probe", PROBE_DEADLINE)
    }

    fn calibrate(&self) -> Result<(), RecognitionError> {
        self.run_device_check("calibrate", CALIBRATE_DEADLINE)
    }

    fn listen(&self, timeout: Duration, phrase_time_limit: Duration) -> Result<String, RecognitionError> {
        let env = [
            (TIMEOUT_ENV, timeout.as_secs().to_string()),
            (PHRASE_LIMIT_ENV, phrase_time_limit.as_secs().to_string()),
        ];
        let deadline = timeout + phrase_time_limit + self.transcribe_timeout;
        match self.run("listen", &env, deadline)? {
            CommandOutcome::Killed => Err(RecognitionError::TimedOut),
            CommandOutcome::Finished { code: Some(EXIT_NO_SPEECH), .. } => Err(RecognitionError::TimedOut),
            CommandOutcome::Finished { success: false, stderr, code, .. } => {
                Err(RecognitionError::Service(if stderr.is_empty() {
                    format!("exit status {:?}", code)
                } else {
                    excerpt(&stderr, 160)
                }))
            }
            CommandOutcome::Finished { stdout, .. } if stdout.is_empty() => Err(RecognitionError::Unintelligible),
            CommandOutcome::Finished { stdout, .. } => Ok(stdout),
        }
    }
}

/// Result of a listen toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    StopRequested,
    /// A stopped capture is still blocked in the recognizer
    StillStopping,
}

pub struct VoiceCapture {
    recognizer: Arc<dyn SpeechRecognizer>,
    listen_timeout: Duration,
    phrase_time_limit: Duration,
    events: EventSender,
    listening: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl VoiceCapture {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, config: &VoiceConfig, events: EventSender) -> Self {
        Self {
            recognizer,
            listen_timeout: config.listen_timeout(),
            phrase_time_limit: config.phrase_time_limit(),
            events,
            listening: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn probe(&self) -> Result<(), RecognitionError> {
        self.recognizer.probe()
    }

    /// Listening was requested and not yet stopped
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// A capture thread is alive
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn toggle(&self) -> ToggleOutcome {
        if self.is_listening() {
            self.stop();
            return ToggleOutcome::StopRequested;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return ToggleOutcome::StillStopping;
        }
        self.listening.store(true, Ordering::Release);

        let capture = CaptureRun {
            recognizer: Arc::clone(&self.recognizer),
            listen_timeout: self.listen_timeout,
            phrase_time_limit: self.phrase_time_limit,
            events: self.events.clone(),
            listening: Arc::clone(&self.listening),
            running: Arc::clone(&self.running),
        };
        let spawned = thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || capture.run());
        if let Err(err) = spawned {
            tracing::error!(error = %err, "Failed to start voice capture thread");
            self.listening.store(false, Ordering::Release);
            self.running.store(false, Ordering::Release);
            self.events.send(UiEvent::SetVoiceIndicator(VoiceState::DeviceError));
            return ToggleOutcome::StopRequested;
        }
        ToggleOutcome::Started
    }

    pub fn stop(&self) {
        self.listening.store(false, Ordering::Release);
    }
}

struct CaptureRun {
    recognizer: Arc<dyn SpeechRecognizer>,
    listen_timeout: Duration,
    phrase_time_limit: Duration,
    events: EventSender,
    listening: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl Drop for CaptureRun {
    fn drop(&mut self) {
        self.listening.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }
}

impl CaptureRun {
    fn still_wanted(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    fn indicate(&self, state: VoiceState) {
        self.events.send(UiEvent::SetVoiceIndicator(state));
    }

    fn run(self) {
        self.indicate(VoiceState::Calibrating);
        if let Err(err) = self.recognizer.calibrate() {
            return self.report(err);
        }
        if !self.still_wanted() {
            return self.indicate(VoiceState::Idle);
        }

        self.indicate(VoiceState::Listening);
        let result = self.recognizer.listen(self.listen_timeout, self.phrase_time_limit);
        if !self.still_wanted() {
            tracing::debug!("Capture stopped, discarding result");
            return self.indicate(VoiceState::Idle);
        }

        self.indicate(VoiceState::Processing);
        match result {
            Ok(text) if text.trim().is_empty() => self.indicate(VoiceState::NoSpeech),
            Ok(text) => {
                tracing::info!(chars = text.len(), "Speech recognized");
                self.indicate(VoiceState::Recognized);
                self.events
                    .send(UiEvent::RequestSubmitQuestion(text.trim().to_string()));
            }
            Err(err) => self.report(err),
        }
    }

    fn report(&self, err: RecognitionError) {
        tracing::warn!(error = %err, "Voice capture failed");
        self.indicate(match err {
            RecognitionError::TimedOut => VoiceState::TimedOut,
            RecognitionError::Unintelligible => VoiceState::Unintelligible,
            RecognitionError::Service(_) => VoiceState::NetworkError,
            RecognitionError::Device(_) => VoiceState::DeviceError,
        });
    }
}
