//! Terminal rendering of the transcript, status line and voice indicator

use chrono::Local;
use coach_core::prelude::*;
use console::style;
use std::io::{self, Stdout, Write};

const SEPARATOR_WIDTH: usize = 50;

pub const WELCOME: &str = "\
Welcome to Interview Coach!

Type a question and press Enter to hear how the candidate would answer it.
Use /eval to switch to evaluation mode and have your own answers critiqued.
Pick a prepared question with /questions and /ask <n>. Type /help for more.";

pub const HELP: &[(&str, &str)] = &[
    ("<text>", "ask a question, or answer it in evaluation mode"),
    ("/eval", "toggle evaluation mode"),
    ("/models", "list models"),
    ("/model <n|name>", "select a model"),
    ("/questions", "list prepared questions"),
    ("/ask <n>", "ask prepared question n"),
    ("/question add <text>", "add a prepared question"),
    ("/question rm <n>", "remove prepared question n"),
    ("/company [text]", "set company context, empty clears it"),
    ("/persona <text>", "replace the personal context"),
    ("/voice", "start or stop voice input"),
    ("/save [path]", "save the conversation"),
    ("/history", "list saved conversations"),
    ("/load <n|path>", "load a saved conversation"),
    ("/clear", "clear the conversation"),
    ("/quit", "exit"),
];

pub struct TerminalRenderer<W: Write = Stdout> {
    out: W,
    entries_shown: usize,
    streaming: bool,
    /// The live entry already shows text, so a failure starts on a new line
    live_has_text: bool,
}

impl TerminalRenderer<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            entries_shown: 0,
            streaming: false,
            live_has_text: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        let written = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush());
        if let Err(err) = written {
            tracing::debug!(error = %err, "Terminal write failed");
        }
    }

    fn header(&mut self, entry: &ConversationEntry) {
        let mut text = String::new();
        if self.entries_shown > 0 {
            text.push_str(&format!("\n{}\n\n", style("─".repeat(SEPARATOR_WIDTH)).dim()));
        }
        self.entries_shown += 1;

        let time = entry.timestamp.with_timezone(&Local).format("%H:%M");
        let (icon, label) = match (entry.speaker, entry.tag) {
            (_, EntryTag::Error) => ("❌", style("Error").red().bold()),
            (Speaker::User, _) => ("👤", style(entry.speaker.label()).green().bold()),
            (Speaker::Assistant, _) => ("🤖", style(entry.speaker.label()).cyan().bold()),
            (Speaker::AssistantEvaluation, _) => ("🧭", style(entry.speaker.label()).magenta().bold()),
        };
        text.push_str(&format!("{} {} {}\n", icon, label, style(format!("({})", time)).dim()));
        self.emit(&text);
    }

    fn show_entry(&mut self, entry: &ConversationEntry) {
        self.header(entry);
        let body = if entry.tag == EntryTag::Error {
            style(entry.text.as_str()).red().to_string()
        } else {
            entry.text.clone()
        };
        self.emit(&format!("{}\n", body));
    }

    /// Out-of-band message that is not part of the conversation
    pub fn notice(&mut self, text: &str, severity: Severity) {
        let line = match severity {
            Severity::Normal => style(format!("ℹ️  {}", text)).dim().to_string(),
            Severity::Warning => style(format!("⚠️  {}", text)).yellow().to_string(),
            Severity::Error => style(format!("❌ {}", text)).red().to_string(),
        };
        self.emit(&format!("{}\n", line));
    }

    pub fn print_welcome(&mut self) {
        self.emit(&format!("{}\n\n", style(WELCOME).cyan()));
    }

    pub fn print_help(&mut self) {
        let mut text = format!("{}\n", style("Commands").bold());
        for (usage, description) in HELP {
            text.push_str(&format!("  {:<22} {}\n", style(usage).cyan(), description));
        }
        self.emit(&text);
    }

    /// Numbered list, `marked` highlights one line
    pub fn print_list(&mut self, title: &str, items: &[String], marked: Option<usize>) {
        let mut text = format!("{}\n", style(title).bold());
        if items.is_empty() {
            text.push_str(&format!("  {}\n", style("(none)").dim()));
        }
        for (i, item) in items.iter().enumerate() {
            let marker = if Some(i) == marked { "*" } else { " " };
            text.push_str(&format!("{} {:>2}. {}\n", style(marker).green(), i + 1, item));
        }
        self.emit(&text);
    }

    pub fn prompt(&mut self) {
        self.emit(&format!("{} ", style(">").cyan().bold()));
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn entry_added(&mut self, entry: &ConversationEntry) {
        self.show_entry(entry);
    }

    fn entry_opened(&mut self, entry: &ConversationEntry) {
        self.header(entry);
        self.streaming = true;
        self.live_has_text = !entry.text.is_empty();
        if self.live_has_text {
            self.emit(&entry.text);
        }
    }

    fn fragment_appended(&mut self, fragment: &str) {
        self.live_has_text |= !fragment.is_empty();
        self.emit(fragment);
    }

    fn failure_appended(&mut self, message: &str) {
        let separator = if self.live_has_text { "\n" } else { "" };
        self.live_has_text = true;
        self.emit(&format!("{}{}", separator, style(format!("❌ {}", message)).red()));
    }

    fn entry_closed(&mut self, _entry: &ConversationEntry) {
        if self.streaming {
            self.streaming = false;
            self.emit("\n");
        }
    }

    fn status_changed(&mut self, status: &Status) {
        self.notice(&status.text, status.severity);
    }

    fn controls_changed(&mut self, enabled: bool) {
        if enabled {
            self.prompt();
        }
    }

    fn voice_changed(&mut self, state: VoiceState) {
        let line = format!("🎤 {}", state.label());
        let line = match state.severity() {
            Severity::Normal if state == VoiceState::Idle => style(line).dim(),
            Severity::Normal => style(line).green(),
            Severity::Warning => style(line).yellow(),
            Severity::Error => style(line).red(),
        };
        self.emit(&format!("{}\n", line));
    }

    fn transcript_reset(&mut self, entries: &[ConversationEntry]) {
        self.entries_shown = 0;
        self.streaming = false;
        self.emit(&format!("\n{}\n", style("═".repeat(SEPARATOR_WIDTH)).dim()));
        for entry in entries {
            self.show_entry(entry);
        }
    }
}
