use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Message, MessageRole};

/// A conversation entry as the chat endpoint sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// The author of the entry.
    pub role: MessageRole,

    /// The entry text.
    pub content: String,
}

impl ClientMessage {
    /// Create a new `ClientMessage`.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new user entry.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a new assistant entry.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

impl From<&Message> for ClientMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role, message.content.clone())
    }
}

/// The JSON body POSTed to the chat endpoint.
///
/// `messages` holds the ordered conversation ending with the new prompt.  Any
/// additional top-level fields configured on the client travel in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The ordered conversation.
    pub messages: Vec<ClientMessage>,

    /// Extra top-level body fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Create a request from prior conversation entries and a new prompt.
    pub fn new(history: impl IntoIterator<Item = ClientMessage>, prompt: impl Into<String>) -> Self {
        let mut messages: Vec<ClientMessage> = history.into_iter().collect();
        messages.push(ClientMessage::user(prompt));
        Self {
            messages,
            extra: Map::new(),
        }
    }

    /// The newest user entry.
    pub fn prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    /// Sets a top-level body field, replacing any previous value.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
