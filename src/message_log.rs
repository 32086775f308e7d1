//! The ordered, append-only log of conversation turns.
//!
//! Only the tail assistant message ever changes after it is appended, and only
//! while its status is `streaming`.  Every mutation publishes a [`Conversation`]
//! snapshot to the log's subscribers.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{Message, MessageId, MessageRole, MessageStatus};

/// A shallow-immutable snapshot of the log, in display order.
///
/// Cloning a snapshot is cheap; the log copies its storage on the first
/// mutation after a snapshot is taken, so a held snapshot never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation(Arc<Vec<Message>>);

impl Conversation {
    /// Returns the message with the given id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.0.iter().find(|m| m.id == id)
    }

    /// Returns true if both snapshots share storage, i.e. nothing changed between them.
    pub fn ptr_eq(&self, other: &Conversation) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for Conversation {
    type Target = [Message];

    fn deref(&self) -> &[Message] {
        &self.0
    }
}

/// Identifies a subscription so that it can be removed again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

type LogListener = Box<dyn FnMut(&Conversation) + Send>;

/// The ordered message log owned by a chat controller.
#[derive(Default)]
pub struct MessageLog {
    messages: Conversation,
    next_id: u64,
    listeners: Vec<(SubscriptionId, LogListener)>,
    next_subscription: u64,
}

impl MessageLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if `status` is streaming while another
    /// message is still streaming.
    pub fn append(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        status: MessageStatus,
    ) -> Result<MessageId> {
        if status == MessageStatus::Streaming
            && let Some(existing) = self.streaming()
        {
            return Err(Error::invariant_violation(format!(
                "cannot open a second streaming message while {existing} is streaming"
            )));
        }
        self.next_id += 1;
        let id = MessageId::new(self.next_id);
        self.storage_mut().push(Message {
            id,
            role,
            content: content.into(),
            status,
        });
        self.publish();
        Ok(id)
    }

    /// Appends `delta` to the content of a streaming message.
    ///
    /// # Errors
    ///
    /// Returns not found if `id` is absent or the message is no longer streaming.
    pub fn update_content(&mut self, id: MessageId, delta: &str) -> Result<()> {
        let message = self.streaming_message_mut(id)?;
        if delta.is_empty() {
            return Ok(());
        }
        message.content.push_str(delta);
        self.publish();
        Ok(())
    }

    /// Moves a streaming message to its final status.
    ///
    /// Finalizing a message that is already final is a no-op and returns
    /// `Ok(false)`, so a duplicated terminal event cannot change the outcome.
    ///
    /// # Errors
    ///
    /// Returns not found if `id` is absent and an invariant violation if
    /// `status` is not a final status.
    pub fn finalize(&mut self, id: MessageId, status: MessageStatus) -> Result<bool> {
        if !status.is_final() {
            return Err(Error::invariant_violation(format!(
                "cannot finalize {id} as streaming"
            )));
        }
        let Some(current) = self.get(id).map(|m| m.status) else {
            return Err(Error::message_not_found(id, "no such message"));
        };
        if current.is_final() {
            return Ok(false);
        }
        let message = self.streaming_message_mut(id)?;
        message.status = status;
        self.publish();
        Ok(true)
    }

    /// Returns the message with the given id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(id)
    }

    /// Returns the id of the streaming message, if there is one.
    pub fn streaming(&self) -> Option<MessageId> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_streaming())
            .map(|m| m.id)
    }

    /// Returns a snapshot of the log.
    pub fn snapshot(&self) -> Conversation {
        self.messages.clone()
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Registers a listener that receives a snapshot after every mutation.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&Conversation) + Send + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId::new(self.next_subscription);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener.  Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn storage_mut(&mut self) -> &mut Vec<Message> {
        Arc::make_mut(&mut self.messages.0)
    }

    fn streaming_message_mut(&mut self, id: MessageId) -> Result<&mut Message> {
        match self.get(id).map(|m| m.status) {
            None => return Err(Error::message_not_found(id, "no such message")),
            Some(MessageStatus::Streaming) => {}
            Some(_) => return Err(Error::message_not_found(id, "message is not streaming")),
        }
        self.storage_mut()
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::message_not_found(id, "no such message"))
    }

    fn publish(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for (_, listener) in self.listeners.iter_mut() {
            listener(&snapshot);
        }
    }
}
