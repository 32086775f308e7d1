//! Output rendering for chat sessions.
//!
//! This module provides the renderer trait used by the terminal front end, a
//! plain-text implementation, and [`TranscriptView`], which turns successive
//! [`ChatState`] snapshots into incremental renderer calls.

use std::io::{self, Stdout, Write};

use crate::controller::ChatState;
use crate::types::{MessageId, MessageRole, MessageStatus};

/// ANSI escape code for dim text (used for informational output).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering streaming output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Recording output in tests
pub trait Renderer: Send {
    /// Print a chunk of response text.
    ///
    /// This is called incrementally as text is streamed from the endpoint.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}
}

/// Plain text renderer with optional ANSI styling.
///
/// This renderer outputs text directly to stdout; errors go to stderr.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            line_start: true,
        }
    }

    /// Returns true if ANSI styling is enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.stdout.write_all(text.as_bytes());
        self.line_start = text.ends_with('\n');
        self.flush();
    }

    fn end_line(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        self.write(text);
    }

    fn print_error(&mut self, error: &str) {
        self.end_line();
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.end_line();
        if self.use_color {
            self.write(&format!("{ANSI_DIM}{info}{ANSI_RESET}\n"));
        } else {
            self.write(&format!("{info}\n"));
        }
    }

    fn finish_response(&mut self) {
        self.end_line();
    }

    fn print_interrupted(&mut self) {
        self.end_line();
        self.write("[interrupted]\n");
    }
}

/// Tracks how much of the newest assistant answer has been rendered.
///
/// Feed it every [`ChatState`] a controller publishes; it emits only the text
/// that is new since the previous state, finishes the response once the message
/// is final, and prints the error reason for failed answers.
#[derive(Debug, Default)]
pub struct TranscriptView {
    current: Option<MessageId>,
    rendered: usize,
    finished: bool,
}

impl TranscriptView {
    /// Creates a view that has rendered nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders whatever changed in `state`.
    pub fn update(&mut self, state: &ChatState, renderer: &mut dyn Renderer) {
        let Some(message) = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
        else {
            return;
        };
        if self.current != Some(message.id) {
            self.current = Some(message.id);
            self.rendered = 0;
            self.finished = false;
        }
        if self.finished {
            return;
        }
        if let Some(delta) = message.content.get(self.rendered..)
            && !delta.is_empty()
        {
            renderer.print_text(delta);
            self.rendered = message.content.len();
        }
        match message.status {
            MessageStatus::Streaming => {}
            MessageStatus::Complete => {
                self.finished = true;
                renderer.finish_response();
            }
            MessageStatus::Errored => {
                self.finished = true;
                renderer.finish_response();
                renderer.print_error(state.error_reason.as_deref().unwrap_or("request failed"));
            }
        }
    }
}
