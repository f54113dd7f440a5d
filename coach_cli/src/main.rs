use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;
use coach_core::config::default_config_path;
use coach_core::prelude::*;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

mod commands;
mod logging;
mod render;

use commands::Flow;
use render::TerminalRenderer;

#[derive(Parser)]
#[command(name = "interview-coach")]
#[command(about = "Interview Coach - rehearse interview answers with streamed AI feedback", long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.interview-coach/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Model to start with, by display name
    #[arg(long, value_name = "NAME")]
    model: Option<String>,

    /// Start in evaluation mode
    #[arg(long)]
    evaluate: bool,

    /// Enable debug logging
    #[arg(short, long, env = "COACH_DEBUG", value_parser = FalseyValueParser::new())]
    debug: bool,

    /// Skip the microphone check and disable voice input
    #[arg(long)]
    no_voice: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    match logging::init(cli.debug) {
        Ok(path) => tracing::debug!(path = %path.display(), dotenv_loaded, "Startup"),
        Err(e) => eprintln!("⚠️ Failed to initialize logger: {:#}", e),
    }

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load_or_default(&config_path);

    let recognizer = if cli.no_voice {
        None
    } else {
        CommandRecognizer::from_config(&config.voice)
    };
    if let Some(recognizer) = &recognizer {
        if let Err(err) = recognizer.probe() {
            tracing::error!(error = %err, "Microphone check failed");
            eprintln!(
                "{} {}",
                console::style("Microphone Error:").red().bold(),
                err
            );
            eprintln!(
                "{}",
                console::style("Fix the voice command in your settings or start with --no-voice.").dim()
            );
            return Ok(ExitCode::FAILURE);
        }
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let context = ProviderContext::from_env(&config).context("Failed to build HTTP client")?;

    let mut dispatcher = Dispatcher::new(
        config,
        Arc::new(context),
        runtime.handle().clone(),
        TerminalRenderer::stdout(),
    )
    .with_config_path(&config_path);
    if let Some(recognizer) = recognizer {
        dispatcher = dispatcher.with_voice(Arc::new(recognizer));
    }

    dispatcher.renderer_mut().print_welcome();
    if let Some(name) = &cli.model {
        if let Err(err) = dispatcher.select_model(name) {
            dispatcher.renderer_mut().notice(&err.to_string(), Severity::Error);
        }
    }
    if cli.evaluate && dispatcher.mode() == PromptMode::Ask {
        dispatcher.toggle_evaluation_mode();
    }
    dispatcher.announce_readiness();
    dispatcher.renderer_mut().prompt();

    run(&mut dispatcher, spawn_stdin_reader());

    if let Err(err) = dispatcher.shutdown() {
        tracing::error!(error = %format!("{:#}", err), "Shutdown");
        eprintln!("⚠️ {:#}", err);
    }
    tracing::info!("Exiting");
    Ok(ExitCode::SUCCESS)
}

/// Lines from stdin arrive on a channel so the prompt loop can keep draining
/// worker events between keystrokes.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

fn run(dispatcher: &mut Dispatcher<TerminalRenderer>, lines: Receiver<String>) {
    let poll = dispatcher.config().poll_interval();
    let mut input_open = true;

    loop {
        dispatcher.tick();

        if !input_open {
            // Piped input ended; let the last answer finish streaming.
            if !dispatcher.is_generating() {
                break;
            }
            thread::sleep(poll);
            continue;
        }

        match lines.recv_timeout(poll) {
            Ok(line) => {
                // Apply anything the worker produced before the new command.
                dispatcher.tick();
                match commands::parse(&line) {
                    Ok(Some(command)) => {
                        if commands::execute(dispatcher, command) == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => dispatcher.renderer_mut().notice(&err.to_string(), Severity::Warning),
                }
                if dispatcher.controls_enabled() {
                    dispatcher.renderer_mut().prompt();
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => input_open = false,
        }
    }
}
