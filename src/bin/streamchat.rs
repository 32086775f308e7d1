//! Interactive chat against a streaming chat endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the default endpoint (http://localhost:8000/api/chat)
//! streamchat
//!
//! # Point at another backend and ask for raw text framing
//! streamchat --endpoint https://chat.example.com/api/chat --protocol text
//!
//! # Send extra headers; disable colors for piping
//! streamchat --headers "authorization=Bearer abc" --no-color
//! ```
//!
//! `STREAMCHAT_ENDPOINT` is used when `--endpoint` is absent and
//! `STREAMCHAT_LOG` sets the log filter (default `warn`).
//!
//! # Commands
//!
//! - `/help` - Show available commands
//! - `/history` - Show the conversation so far
//! - `/stats` - Show session statistics
//! - `/config` - Show the current configuration
//! - `/quit` - Exit the application
//!
//! Ctrl-C while an answer is streaming stops it and keeps the partial text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use streamchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ENDPOINT_ENV, PlainTextRenderer, Renderer, TranscriptView,
    help_text, parse_command,
};
use streamchat::{
    ChatClient, ChatController, MessageRole, MessageStatus, StreamConsumer, StreamHandle,
};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "STREAMCHAT_LOG";

/// Main entry point for the streamchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (mut args, _) = ChatArgs::from_command_line_relaxed("streamchat [OPTIONS]");
    if args.endpoint.is_none() {
        args.endpoint = std::env::var(ENDPOINT_ENV).ok().filter(|s| !s.is_empty());
    }
    let config = ChatConfig::try_from(args)?;
    let client = ChatClient::from_config(&config)?;
    let mut controller = ChatController::new(StreamConsumer::new(Arc::new(client)));
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    let mut view = TranscriptView::new();
    let mut view_renderer = PlainTextRenderer::with_color(config.use_color);
    controller.subscribe(move |state| view.update(state, &mut view_renderer));

    // Ctrl-C outside the prompt cancels whatever is streaming.
    let live: Arc<Mutex<Option<StreamHandle>>> = Arc::new(Mutex::new(None));
    let interrupted = Arc::new(AtomicBool::new(false));
    let live_clone = live.clone();
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        let live = live_clone.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = live.as_ref()
            && handle.cancel()
        {
            interrupted_clone.store(true, Ordering::Relaxed);
        }
    })?;

    println!("streamchat ({})", config.endpoint);
    println!("Type /help for commands, /quit to exit\n");

    loop {
        interrupted.store(false, Ordering::Relaxed);

        match rl.readline("You: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::History => print_history(&controller),
                        ChatCommand::Stats => print_stats(&controller),
                        ChatCommand::ShowConfig => print_config(&config),
                        ChatCommand::Invalid(message) => renderer.print_error(&message),
                    }
                    continue;
                }

                println!("Assistant:");
                if let Err(err) = controller.submit(line) {
                    renderer.print_error(&err.to_string());
                    continue;
                }
                *live.lock().unwrap_or_else(|e| e.into_inner()) = controller.handle();
                let outcome = controller.run_until_idle().await;
                *live.lock().unwrap_or_else(|e| e.into_inner()) = None;
                if let Err(err) = outcome {
                    renderer.print_error(&err.to_string());
                }
                if interrupted.swap(false, Ordering::Relaxed) {
                    renderer.print_interrupted();
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

fn print_history(controller: &ChatController) {
    let messages = controller.messages();
    if messages.is_empty() {
        println!("    (no messages yet)");
        return;
    }
    for message in messages.iter() {
        let speaker = match message.role {
            MessageRole::User => "You",
            MessageRole::Assistant => "Assistant",
        };
        let marker = match message.status {
            MessageStatus::Complete => "",
            MessageStatus::Streaming => " (streaming)",
            MessageStatus::Errored => " (failed)",
        };
        println!("    {speaker}{marker}: {}", message.content);
    }
}

fn print_stats(controller: &ChatController) {
    let stats = controller.stats();
    println!("    Session Statistics:");
    println!("      Status: {}", controller.status());
    if let Some(reason) = controller.error_reason() {
        println!("      Last error: {reason}");
    }
    println!("      Messages: {}", stats.message_count);
    println!(
        "      Requests: {} ({} completed, {} failed, {} cancelled)",
        stats.total_requests, stats.completed, stats.errored, stats.cancelled
    );
    println!(
        "      Total tokens: {} in / {} out",
        stats.usage.prompt_tokens, stats.usage.completion_tokens
    );
}

fn print_config(config: &ChatConfig) {
    println!("    Current Configuration:");
    println!("      Endpoint: {}", config.endpoint);
    println!("      Protocol: {}", config.protocol);
    println!("      Connect timeout: {}s", config.timeout.as_secs());
    if config.headers.is_empty() {
        println!("      Headers: (none)");
    } else {
        println!("      Headers:");
        for (name, _) in &config.headers {
            println!("        - {name}");
        }
    }
    println!(
        "      Colors: {}",
        if config.use_color { "on" } else { "off" }
    );
}
