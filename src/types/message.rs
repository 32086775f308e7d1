use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a message within one conversation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Lifecycle of a message's content.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// The content is final.
    Complete,

    /// Text is still arriving.  At most one message in a log is streaming.
    Streaming,

    /// The stream failed; whatever text arrived before the failure is kept.
    Errored,
}

impl MessageStatus {
    /// Returns true for the two final states.
    pub fn is_final(&self) -> bool {
        !matches!(self, MessageStatus::Streaming)
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the owning log.
    pub id: MessageId,

    /// The author of the message.
    pub role: MessageRole,

    /// The message text.
    pub content: String,

    /// Whether the content is final.
    pub status: MessageStatus,
}

impl Message {
    /// Returns true if the message is the one currently receiving chunks.
    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn message_serialization() {
        let message = Message {
            id: MessageId::new(7),
            role: MessageRole::Assistant,
            content: "Hi there!".to_string(),
            status: MessageStatus::Errored,
        };
        assert_eq!(
            to_value(&message).unwrap(),
            json!({
                "id": 7,
                "role": "assistant",
                "content": "Hi there!",
                "status": "errored"
            })
        );
    }

    #[test]
    fn id_display() {
        assert_eq!(MessageId::new(12).to_string(), "msg_12");
    }

    #[test]
    fn final_states() {
        assert!(MessageStatus::Complete.is_final());
        assert!(MessageStatus::Errored.is_final());
        assert!(!MessageStatus::Streaming.is_final());
    }
}
