//! Interactive chat application glue.
//!
//! This module provides the pieces the `streamchat` REPL is built from:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing
//!
//! The streaming state machine itself lives in [`crate::controller`]; the
//! terminal output in [`crate::render`].

mod commands;
mod config;

pub use crate::render::{PlainTextRenderer, Renderer, TranscriptView};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ENDPOINT_ENV, parse_headers};
