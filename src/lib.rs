//! A streaming chat client core.
//!
//! [`ChatController`] keeps an ordered [`MessageLog`], submits prompts through a
//! [`StreamConsumer`], merges streamed text into the in-progress assistant
//! message, and publishes [`ChatState`] snapshots to subscribers.  The HTTP side
//! is a [`Transport`]; [`ChatClient`] implements it with reqwest.

// Public modules
pub mod chat;
pub mod chat_logger;
pub mod client;
pub mod consumer;
pub mod controller;
pub mod data_stream;
pub mod error;
pub mod message_log;
pub mod observability;
pub mod render;
pub mod transport;
pub mod types;

// Re-exports
pub use chat_logger::ChatLogger;
pub use client::ChatClient;
pub use consumer::{EventSink, EventSource, HandleId, StreamConsumer, StreamHandle, event_channel};
pub use controller::{ChatController, ChatState, Phase, SessionStats, Subscription};
pub use data_stream::{DataStreamCodec, TextStreamCodec, decode_protocol, decode_stream};
pub use error::{Error, Result};
pub use message_log::{Conversation, MessageLog, SubscriptionId};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer, TranscriptView};
pub use transport::{ChannelTransport, PartSender, PartStream, Transport};
pub use types::*;
