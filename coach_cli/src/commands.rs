//! Slash commands typed at the prompt
//!
//! Anything not starting with `/` is submitted as a question (or an answer in
//! evaluation mode). List positions are one-based on screen.

use crate::render::TerminalRenderer;
use chrono::Local;
use coach_core::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    Help,
    Quit,
    ToggleEvaluation,
    Models,
    SelectModel(Choice),
    Questions,
    Ask(usize),
    AddQuestion(String),
    RemoveQuestion(usize),
    Company(String),
    Persona(String),
    Voice,
    Save(Option<PathBuf>),
    History,
    Load(Choice),
    Clear,
}

/// A list position or a literal name/path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Position(usize),
    Named(String),
}

impl Choice {
    fn parse(arg: &str) -> Self {
        match arg.parse::<usize>() {
            Ok(n) if n > 0 => Choice::Position(n),
            _ => Choice::Named(arg.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '/{0}'. Type /help for the list.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Whether the prompt loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(body) = line.strip_prefix('/') else {
        return Ok(Some(Command::Submit(line.to_string())));
    };

    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "eval" | "evaluate" => Command::ToggleEvaluation,
        "models" => Command::Models,
        "model" if rest.is_empty() => Command::Models,
        "model" => Command::SelectModel(Choice::parse(rest)),
        "questions" => Command::Questions,
        "ask" => Command::Ask(position(rest, "/ask <n>")?),
        "question" => parse_question(rest)?,
        "company" => Command::Company(rest.to_string()),
        "persona" if rest.is_empty() => return Err(ParseError::Usage("/persona <text>")),
        "persona" => Command::Persona(rest.to_string()),
        "voice" | "mic" => Command::Voice,
        "save" if rest.is_empty() => Command::Save(None),
        "save" => Command::Save(Some(PathBuf::from(rest))),
        "history" => Command::History,
        "load" if rest.is_empty() => return Err(ParseError::Usage("/load <n|path>")),
        "load" => Command::Load(Choice::parse(rest)),
        "clear" => Command::Clear,
        _ => return Err(ParseError::Unknown(name.to_string())),
    };
    Ok(Some(command))
}

fn parse_question(rest: &str) -> Result<Command, ParseError> {
    const USAGE: &str = "/question add <text> | /question rm <n>";
    let (action, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(a, b)| (a, b.trim()))
        .unwrap_or((rest, ""));
    match action {
        "add" if !arg.is_empty() => Ok(Command::AddQuestion(arg.to_string())),
        "rm" | "remove" => Ok(Command::RemoveQuestion(position(arg, USAGE)?)),
        _ => Err(ParseError::Usage(USAGE)),
    }
}

fn position(arg: &str, usage: &'static str) -> Result<usize, ParseError> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::Usage(usage)),
    }
}

/// Run a command against the dispatcher, reporting problems inline
pub fn execute<W: Write>(d: &mut Dispatcher<TerminalRenderer<W>>, command: Command) -> Flow {
    match command {
        Command::Quit => return Flow::Quit,
        Command::Help => d.renderer_mut().print_help(),
        Command::Submit(text) => {
            let result = d.submit_text(&text);
            report(d, result);
        }
        Command::ToggleEvaluation => {
            d.toggle_evaluation_mode();
        }
        Command::Models => show_models(d),
        Command::SelectModel(choice) => {
            let name = match choice {
                Choice::Position(n) => match d.models().get(n - 1).map(|m| m.display_name.clone()) {
                    Some(name) => name,
                    None => {
                        d.renderer_mut()
                            .notice(&format!("There is no model #{}", n), Severity::Error);
                        return Flow::Continue;
                    }
                },
                Choice::Named(name) => name,
            };
            if let Err(err) = d.select_model(&name) {
                d.renderer_mut().notice(&err.to_string(), Severity::Error);
            }
        }
        Command::Questions => {
            let questions = d.questions().to_vec();
            d.renderer_mut().print_list("Prepared questions", &questions, None);
        }
        Command::Ask(n) => {
            let result = d.submit_predefined(n - 1);
            report(d, result);
        }
        Command::AddQuestion(text) => match d.add_question(&text) {
            Ok(n) => d
                .renderer_mut()
                .notice(&format!("Added question #{}", n), Severity::Normal),
            Err(err) => d.renderer_mut().notice(&err.to_string(), Severity::Error),
        },
        Command::RemoveQuestion(n) => match d.remove_question(n - 1) {
            Ok(removed) => d
                .renderer_mut()
                .notice(&format!("Removed: {}", removed), Severity::Normal),
            Err(err) => d.renderer_mut().notice(&err.to_string(), Severity::Error),
        },
        Command::Company(text) => d.set_company_context(&text),
        Command::Persona(text) => {
            let result = d.set_personal_context(&text);
            report(d, result);
        }
        Command::Voice => {
            if d.toggle_listening() == Some(ToggleOutcome::StopRequested) {
                d.renderer_mut()
                    .notice("Stopping voice capture", Severity::Normal);
            }
        }
        Command::Save(path) => {
            if let Err(err) = d.export(path.as_deref()) {
                notice_anyhow(d, "Save failed", &err);
            }
        }
        Command::History => show_history(d),
        Command::Load(choice) => {
            let path = match choice {
                Choice::Named(path) => PathBuf::from(path),
                Choice::Position(n) => match saved_path(d, n) {
                    Some(path) => path,
                    None => return Flow::Continue,
                },
            };
            if let Err(err) = d.import(&path) {
                notice_anyhow(d, "Load failed", &err);
            }
        }
        Command::Clear => {
            let result = d.clear();
            report(d, result);
        }
    }
    Flow::Continue
}

fn report<W: Write>(d: &mut Dispatcher<TerminalRenderer<W>>, result: Result<(), UserInputError>) {
    if let Err(err) = result {
        let severity = match err {
            UserInputError::Busy => Severity::Warning,
            _ => Severity::Error,
        };
        d.renderer_mut().notice(&err.to_string(), severity);
    }
}

fn notice_anyhow<W: Write>(d: &mut Dispatcher<TerminalRenderer<W>>, what: &str, err: &anyhow::Error) {
    tracing::warn!(error = %format!("{:#}", err), "{}", what);
    d.renderer_mut()
        .notice(&format!("{}: {:#}", what, err), Severity::Error);
}

fn show_models<W: Write>(d: &mut Dispatcher<TerminalRenderer<W>>) {
    let credentials = &d.context().credentials;
    let lines: Vec<String> = d
        .models()
        .iter()
        .map(|m| {
            let ready = if credentials.has_provider(m.provider_kind) {
                ""
            } else {
                " (no key)"
            };
            format!("{}{}", m.display_name, ready)
        })
        .collect();
    let selected = d.models().iter().position(|m| m.display_name == d.selected_model());
    d.renderer_mut().print_list("Models", &lines, selected);
}

fn show_history<W: Write>(d: &mut Dispatcher<TerminalRenderer<W>>) {
    match d.saved_conversations() {
        Ok(saved) => {
            let lines: Vec<String> = saved
                .iter()
                .map(|c| {
                    format!(
                        "{} ({} messages, {})",
                        c.title,
                        c.entry_count,
                        c.saved_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                    )
                })
                .collect();
            d.renderer_mut().print_list("Saved conversations", &lines, None);
        }
        Err(err) => notice_anyhow(d, "Could not list conversations", &err),
    }
}

fn saved_path<W: Write>(d: &mut Dispatcher<TerminalRenderer<W>>, n: usize) -> Option<PathBuf> {
    match d.saved_conversations() {
        Ok(saved) => match saved.into_iter().nth(n - 1) {
            Some(conversation) => Some(conversation.path),
            None => {
                d.renderer_mut()
                    .notice(&format!("There is no saved conversation #{}", n), Severity::Error);
                None
            }
        },
        Err(err) => {
            notice_anyhow(d, "Could not list conversations", &err);
            None
        }
    }
}
