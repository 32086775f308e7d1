//! The chat session controller.
//!
//! A [`ChatController`] owns the message log and at most one live
//! [`StreamHandle`].  It turns user intents (`submit`, `cancel`) and stream
//! events into log mutations and status changes, and publishes a [`ChatState`]
//! to its subscribers after every change.
//!
//! The controller is a plain value: events are applied only when its owner calls
//! [`ChatController::pump`] (or [`ChatController::apply`]), so mutations never
//! interleave.  Events from a handle that is no longer live are discarded by
//! comparing [`HandleId`]s.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, error, warn};

use crate::consumer::{
    EventSink, EventSource, HandleId, StreamConsumer, StreamHandle, event_channel,
};
use crate::error::{Error, Result};
use crate::message_log::{Conversation, MessageLog, SubscriptionId};
use crate::observability::{SESSION_STALE_EVENTS, SESSION_SUBMITS};
use crate::types::{
    ChatRequest, ClientMessage, MessageId, MessageRole, MessageStatus, SessionStatus, StreamEvent,
    Usage,
};

/// Where the controller is in its request lifecycle.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    /// No request in flight.
    #[default]
    Idle,
    /// A request was sent and no text has arrived yet.
    Awaiting,
    /// Text is arriving.
    Streaming,
}

/// What subscribers see after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Snapshot of the conversation.
    pub messages: Conversation,
    /// Summary status for the render layer.
    pub status: SessionStatus,
    /// Why the last request failed, while `status` is `error`.
    pub error_reason: Option<String>,
    /// Finer-grained lifecycle detail.
    pub phase: Phase,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// Total number of requests started.
    pub total_requests: u64,
    /// Requests that finished normally.
    pub completed: u64,
    /// Requests that ended in an error.
    pub errored: u64,
    /// Requests stopped by cancellation or replacement.
    pub cancelled: u64,
    /// Token usage reported by finished requests.
    pub usage: Usage,
}

type StateListener = Box<dyn FnMut(&ChatState) + Send>;

#[derive(Default)]
struct Listeners {
    entries: Vec<(SubscriptionId, StateListener)>,
    next: u64,
}

/// Keeps a state listener registered.
///
/// Dropping a `Subscription` leaves the listener in place; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// The id of the subscription.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the listener.  Returns false if it was already removed or the
    /// controller is gone.
    ///
    /// Must not be called from inside a listener.
    pub fn unsubscribe(&self) -> bool {
        match self.listeners.upgrade() {
            Some(listeners) => remove_listener(&listeners, self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

fn remove_listener(listeners: &Mutex<Listeners>, id: SubscriptionId) -> bool {
    let mut listeners = listeners.lock().unwrap_or_else(|e| e.into_inner());
    let before = listeners.entries.len();
    listeners.entries.retain(|(existing, _)| *existing != id);
    listeners.entries.len() != before
}

struct ActiveStream {
    handle: StreamHandle,
    message: MessageId,
}

/// Orchestrates the message log and the stream consumer for one conversation.
pub struct ChatController {
    consumer: StreamConsumer,
    log: MessageLog,
    status: SessionStatus,
    error_reason: Option<String>,
    phase: Phase,
    active: Option<ActiveStream>,
    sink: EventSink,
    events: EventSource,
    listeners: Arc<Mutex<Listeners>>,
    stats: SessionStats,
}

impl ChatController {
    /// Creates an idle controller with an empty conversation.
    pub fn new(consumer: StreamConsumer) -> Self {
        let (sink, events) = event_channel();
        Self {
            consumer,
            log: MessageLog::new(),
            status: SessionStatus::Idle,
            error_reason: None,
            phase: Phase::Idle,
            active: None,
            sink,
            events,
            listeners: Arc::new(Mutex::new(Listeners::default())),
            stats: SessionStats::default(),
        }
    }

    /// Submits a prompt and starts streaming the answer.
    ///
    /// Appends the user message and an empty streaming assistant message, then
    /// opens a stream with the whole prior conversation plus the prompt.  A
    /// stream that is still live is cancelled first; its partial answer is kept
    /// as a complete message.  Must be called within a Tokio runtime.
    ///
    /// Returns the id of the new assistant message.
    ///
    /// # Errors
    ///
    /// Returns a validation error, and changes nothing, if `prompt` is empty or
    /// only whitespace.
    pub fn submit(&mut self, prompt: &str) -> Result<MessageId> {
        if prompt.trim().is_empty() {
            return Err(Error::validation(
                "prompt must not be empty",
                Some("prompt".to_string()),
            ));
        }
        if let Some(previous) = self.active.take() {
            debug!(handle = %previous.handle.id(), "replacing live stream");
            previous.handle.cancel();
            self.settle_cancelled(previous.message);
        }

        let history: Vec<ClientMessage> = self
            .log
            .snapshot()
            .iter()
            .map(ClientMessage::from)
            .collect();
        self.log
            .append(MessageRole::User, prompt, MessageStatus::Complete)?;
        let message = self
            .log
            .append(MessageRole::Assistant, "", MessageStatus::Streaming)?;

        let request = ChatRequest::new(history, prompt);
        let handle = self.consumer.start(request, self.sink.clone());
        debug!(handle = %handle.id(), message = %message, "submitted prompt");
        self.active = Some(ActiveStream { handle, message });
        self.status = SessionStatus::Loading;
        self.error_reason = None;
        self.phase = Phase::Awaiting;
        self.stats.total_requests += 1;
        SESSION_SUBMITS.click();
        self.publish();
        Ok(message)
    }

    /// Stops the live stream, keeping whatever text has arrived.
    ///
    /// The assistant message is finalized as complete and the status returns to
    /// idle immediately.  Returns false if nothing was streaming.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.handle.cancel();
        self.settle_cancelled(active.message);
        self.publish();
        true
    }

    /// Applies one event from the handle identified by `handle`.
    ///
    /// Returns false if the event came from a handle that is not live and was
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the log rejects a mutation for the live
    /// stream's message.
    pub fn apply(&mut self, handle: HandleId, event: StreamEvent) -> Result<bool> {
        let message = match &self.active {
            Some(active) if active.handle.id() == handle => active.message,
            _ => {
                SESSION_STALE_EVENTS.click();
                warn!(handle = %handle, event = ?event, "discarding event from stale handle");
                return Ok(false);
            }
        };

        match event {
            StreamEvent::Chunk(text) => {
                self.log
                    .update_content(message, &text)
                    .map_err(|err| lost_message(message, err))?;
                self.phase = Phase::Streaming;
            }
            StreamEvent::Done(finish) => {
                self.active = None;
                self.finalize(message, MessageStatus::Complete)?;
                if let Some(usage) = finish.and_then(|f| f.usage) {
                    self.stats.usage = self.stats.usage + usage;
                }
                self.status = SessionStatus::Idle;
                self.phase = Phase::Idle;
                self.stats.completed += 1;
            }
            StreamEvent::Error(reason) => {
                self.active = None;
                warn!(message = %message, reason = %reason, "response failed");
                self.finalize(message, MessageStatus::Errored)?;
                self.status = SessionStatus::Error;
                self.error_reason = Some(reason);
                self.phase = Phase::Idle;
                self.stats.errored += 1;
            }
            StreamEvent::Cancelled => {
                self.active = None;
                self.settle_cancelled(message);
            }
        }
        self.publish();
        Ok(true)
    }

    /// Waits for the next stream event and applies it.
    ///
    /// Returns immediately with `Ok(false)` when no stream is live; events left
    /// over from replaced handles are drained and discarded.
    pub async fn pump(&mut self) -> Result<bool> {
        if self.active.is_none() {
            while let Ok((handle, event)) = self.events.try_recv() {
                self.apply(handle, event)?;
            }
            return Ok(false);
        }
        match self.events.recv().await {
            Some((handle, event)) => self.apply(handle, event),
            None => Ok(false),
        }
    }

    /// Pumps events until no stream is live.
    pub async fn run_until_idle(&mut self) -> Result<()> {
        while self.active.is_some() {
            self.pump().await?;
        }
        Ok(())
    }

    /// Registers a listener that receives the state after every change.
    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&ChatState) + Send + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.next += 1;
        let id = SubscriptionId::new(listeners.next);
        listeners.entries.push((id, Box::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Removes a listener.  Returns false if it was already removed.
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        remove_listener(&self.listeners, subscription.id())
    }

    /// The current state.
    pub fn state(&self) -> ChatState {
        ChatState {
            messages: self.log.snapshot(),
            status: self.status,
            error_reason: self.error_reason.clone(),
            phase: self.phase,
        }
    }

    /// A snapshot of the conversation.
    pub fn messages(&self) -> Conversation {
        self.log.snapshot()
    }

    /// The session status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Why the last request failed, while the status is `error`.
    pub fn error_reason(&self) -> Option<&str> {
        self.error_reason.as_deref()
    }

    /// The request lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true while a stream is live.
    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// The live stream's handle.
    ///
    /// Cancelling it from elsewhere (a signal handler, a timer) is reported back
    /// through [`pump`](Self::pump) as a `Cancelled` event.
    pub fn handle(&self) -> Option<StreamHandle> {
        self.active.as_ref().map(|active| active.handle.clone())
    }

    /// Returns stats for the session so far.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            message_count: self.log.len(),
            ..self.stats.clone()
        }
    }

    fn settle_cancelled(&mut self, message: MessageId) {
        if let Err(err) = self.finalize(message, MessageStatus::Complete) {
            error!(message = %message, error = %err, "could not finalize cancelled message");
        }
        self.status = SessionStatus::Idle;
        self.error_reason = None;
        self.phase = Phase::Idle;
        self.stats.cancelled += 1;
    }

    fn finalize(&mut self, message: MessageId, status: MessageStatus) -> Result<()> {
        self.log
            .finalize(message, status)
            .map(|_| ())
            .map_err(|err| lost_message(message, err))
    }

    fn publish(&mut self) {
        let state = self.state();
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for (_, listener) in listeners.entries.iter_mut() {
            listener(&state);
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.cancel();
        }
    }
}

impl fmt::Debug for ChatController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatController")
            .field("consumer", &self.consumer)
            .field("messages", &self.log.len())
            .field("status", &self.status)
            .field("phase", &self.phase)
            .field("live", &self.active.as_ref().map(|a| a.handle.id()))
            .finish_non_exhaustive()
    }
}

fn lost_message(message: MessageId, err: Error) -> Error {
    Error::invariant_violation(format!("live stream lost its message {message}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::ChannelTransport;
    use crate::types::{Finish, Message, StreamPart};

    fn text(s: &str) -> StreamPart {
        StreamPart::Text(s.to_string())
    }

    fn controller(transport: &Arc<ChannelTransport>) -> ChatController {
        ChatController::new(StreamConsumer::new(transport.clone()))
    }

    fn summary(messages: &[Message]) -> Vec<(MessageRole, String, MessageStatus)> {
        messages
            .iter()
            .map(|m| (m.role, m.content.clone(), m.status))
            .collect()
    }

    #[tokio::test]
    async fn hello_round_trip() {
        let transport = Arc::new(ChannelTransport::new());
        transport.push_parts(vec![text("Hi"), text(" there"), text("!")]);
        let mut controller = controller(&transport);

        controller.submit("Hello").unwrap();
        assert_eq!(controller.status(), SessionStatus::Loading);
        assert_eq!(controller.phase(), Phase::Awaiting);
        controller.run_until_idle().await.unwrap();

        let state = controller.state();
        assert_eq!(
            summary(&state.messages),
            vec![
                (MessageRole::User, "Hello".to_string(), MessageStatus::Complete),
                (
                    MessageRole::Assistant,
                    "Hi there!".to_string(),
                    MessageStatus::Complete
                ),
            ]
        );
        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.error_reason, None);
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(
            transport.requests()[0].messages,
            vec![ClientMessage::user("Hello")]
        );
    }

    #[tokio::test]
    async fn transport_failure_keeps_partial_text() {
        let transport = Arc::new(ChannelTransport::new());
        let tx = transport.push_stream();
        let mut controller = controller(&transport);

        let id = controller.submit("Explain X").unwrap();
        tx.unbounded_send(Ok(text("Sure, "))).unwrap();
        tx.unbounded_send(Err(Error::connection("connection reset by peer", None)))
            .unwrap();
        controller.run_until_idle().await.unwrap();

        let message = controller.messages().get(id).cloned().unwrap();
        assert_eq!(message.content, "Sure, ");
        assert_eq!(message.status, MessageStatus::Errored);
        assert_eq!(controller.status(), SessionStatus::Error);
        assert!(
            controller
                .error_reason()
                .is_some_and(|reason| reason.contains("connection reset by peer"))
        );
        assert_eq!(controller.stats().errored, 1);
    }

    #[tokio::test]
    async fn chunks_concatenate_in_order() {
        let pieces = ["a", "bc", "", "δε", "f g", "\n", "!"];
        let transport = Arc::new(ChannelTransport::new());
        transport.push_parts(pieces.iter().map(|p| text(p)));
        let mut controller = controller(&transport);

        let id = controller.submit("go").unwrap();
        controller.run_until_idle().await.unwrap();
        assert_eq!(
            controller.messages().get(id).unwrap().content,
            pieces.concat()
        );
    }

    #[tokio::test]
    async fn empty_response_completes() {
        let transport = Arc::new(ChannelTransport::new());
        transport.push_parts(Vec::new());
        let mut controller = controller(&transport);

        let id = controller.submit("Hello").unwrap();
        controller.run_until_idle().await.unwrap();
        let message = controller.messages().get(id).cloned().unwrap();
        assert_eq!(message.content, "");
        assert_eq!(message.status, MessageStatus::Complete);
        assert_eq!(controller.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn cancel_before_any_chunk() {
        let transport = Arc::new(ChannelTransport::new());
        let tx = transport.push_stream();
        let mut controller = controller(&transport);

        let id = controller.submit("Hello").unwrap();
        assert!(controller.cancel());
        assert!(!controller.cancel());

        let message = controller.messages().get(id).cloned().unwrap();
        assert_eq!(message.content, "");
        assert_eq!(message.status, MessageStatus::Complete);
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert!(!controller.is_streaming());

        let _ = tx.unbounded_send(Ok(text("late")));
        tokio::task::yield_now().await;
        assert!(!controller.pump().await.unwrap());
        assert_eq!(controller.messages().get(id).unwrap().content, "");
    }

    #[tokio::test]
    async fn late_chunk_after_cancel_is_ignored() {
        let transport = Arc::new(ChannelTransport::new());
        let tx = transport.push_stream();
        let mut controller = controller(&transport);

        let id = controller.submit("Hello").unwrap();
        let handle = controller.handle().unwrap();
        tx.unbounded_send(Ok(text("Hi"))).unwrap();
        assert!(controller.pump().await.unwrap());
        assert_eq!(controller.phase(), Phase::Streaming);

        assert!(controller.cancel());
        let _ = tx.unbounded_send(Ok(text(" late")));
        assert!(
            !controller
                .apply(handle.id(), StreamEvent::Chunk("injected".to_string()))
                .unwrap()
        );
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        controller.pump().await.unwrap();

        let message = controller.messages().get(id).cloned().unwrap();
        assert_eq!(message.content, "Hi");
        assert_eq!(message.status, MessageStatus::Complete);
        assert_eq!(controller.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn submit_while_streaming_replaces_handle() {
        let transport = Arc::new(ChannelTransport::new());
        let first_tx = transport.push_stream();
        let second_tx = transport.push_stream();
        let mut controller = controller(&transport);

        let first = controller.submit("first").unwrap();
        let first_handle = controller.handle().unwrap();
        first_tx.unbounded_send(Ok(text("A"))).unwrap();
        assert!(controller.pump().await.unwrap());

        let second = controller.submit("second").unwrap();
        let second_handle = controller.handle().unwrap();
        assert_ne!(first_handle.id(), second_handle.id());
        assert!(first_handle.is_cancelled());

        let _ = first_tx.unbounded_send(Ok(text("stale")));
        second_tx.unbounded_send(Ok(text("B"))).unwrap();
        drop(second_tx);
        controller.run_until_idle().await.unwrap();
        assert!(
            !controller
                .apply(first_handle.id(), StreamEvent::Chunk("x".to_string()))
                .unwrap()
        );

        let messages = controller.messages();
        assert_eq!(
            summary(&messages),
            vec![
                (MessageRole::User, "first".to_string(), MessageStatus::Complete),
                (MessageRole::Assistant, "A".to_string(), MessageStatus::Complete),
                (MessageRole::User, "second".to_string(), MessageStatus::Complete),
                (MessageRole::Assistant, "B".to_string(), MessageStatus::Complete),
            ]
        );
        assert_eq!(messages.get(first).unwrap().content, "A");
        assert_eq!(messages.get(second).unwrap().content, "B");

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].messages,
            vec![
                ClientMessage::user("first"),
                ClientMessage::assistant("A"),
                ClientMessage::user("second"),
            ]
        );
        let stats = controller.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn second_terminal_is_a_no_op() {
        let transport = Arc::new(ChannelTransport::new());
        let _tx = transport.push_stream();
        let mut controller = controller(&transport);

        let id = controller.submit("Hello").unwrap();
        let handle = controller.handle().unwrap().id();
        assert!(
            controller
                .apply(handle, StreamEvent::Chunk("Sure, ".to_string()))
                .unwrap()
        );
        assert!(
            controller
                .apply(handle, StreamEvent::Error("boom".to_string()))
                .unwrap()
        );
        assert!(!controller.apply(handle, StreamEvent::Done(None)).unwrap());

        let message = controller.messages().get(id).cloned().unwrap();
        assert_eq!(message.content, "Sure, ");
        assert_eq!(message.status, MessageStatus::Errored);
        assert_eq!(controller.error_reason(), Some("boom"));
        assert_eq!(controller.stats().errored, 1);
        assert_eq!(controller.stats().completed, 0);
    }

    #[tokio::test]
    async fn error_status_clears_on_next_submit() {
        let transport = Arc::new(ChannelTransport::new());
        transport.push_failure(Error::status(503, "try later", None));
        transport.push_parts(vec![text("ok")]);
        let mut controller = controller(&transport);

        controller.submit("one").unwrap();
        controller.run_until_idle().await.unwrap();
        assert_eq!(controller.status(), SessionStatus::Error);
        assert_eq!(controller.phase(), Phase::Idle);

        controller.submit("two").unwrap();
        assert_eq!(controller.status(), SessionStatus::Loading);
        assert_eq!(controller.error_reason(), None);
        controller.run_until_idle().await.unwrap();
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert_eq!(
            transport.requests()[1].messages[1].content,
            "",
            "errored answers are sent back as they stand"
        );
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let transport = Arc::new(ChannelTransport::new());
        let mut controller = controller(&transport);
        assert!(controller.submit("").unwrap_err().is_validation());
        assert!(controller.submit("  \n").unwrap_err().is_validation());
        assert!(controller.messages().is_empty());
        assert!(transport.requests().is_empty());
        assert_eq!(controller.stats(), SessionStats::default());
    }

    #[tokio::test]
    async fn subscribers_observe_each_change() {
        let transport = Arc::new(ChannelTransport::new());
        transport.push_parts(vec![text("Hi"), text("!")]);
        let mut controller = controller(&transport);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = controller.subscribe(move |state| {
            let tail = state.messages.last().map(|m| m.content.clone());
            sink.lock().unwrap().push((state.status, state.phase, tail));
        });

        controller.submit("Hello").unwrap();
        controller.run_until_idle().await.unwrap();
        assert!(subscription.unsubscribe());
        assert!(!controller.unsubscribe(&subscription));

        transport.push_parts(Vec::new());
        controller.submit("again").unwrap();
        controller.run_until_idle().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (SessionStatus::Loading, Phase::Awaiting, Some(String::new())),
                (SessionStatus::Loading, Phase::Streaming, Some("Hi".to_string())),
                (SessionStatus::Loading, Phase::Streaming, Some("Hi!".to_string())),
                (SessionStatus::Idle, Phase::Idle, Some("Hi!".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn usage_accumulates() {
        let transport = Arc::new(ChannelTransport::new());
        transport.push_parts(vec![
            text("Hi"),
            StreamPart::FinishMessage(Finish::stop().with_usage(Usage::new(3, 5))),
        ]);
        transport.push_parts(vec![StreamPart::FinishStep(
            Finish::stop().with_usage(Usage::new(1, 1)),
        )]);
        let mut controller = controller(&transport);

        controller.submit("one").unwrap();
        controller.run_until_idle().await.unwrap();
        controller.submit("two").unwrap();
        controller.run_until_idle().await.unwrap();

        let stats = controller.stats();
        assert_eq!(stats.usage, Usage::new(4, 6));
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.message_count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_finalizes_like_cancel() {
        let transport = Arc::new(ChannelTransport::new());
        let tx = transport.push_stream();
        let mut controller = ChatController::new(
            StreamConsumer::new(transport.clone()).with_deadline(Duration::from_secs(5)),
        );

        let id = controller.submit("Hello").unwrap();
        tx.unbounded_send(Ok(text("Part"))).unwrap();
        controller.run_until_idle().await.unwrap();

        let message = controller.messages().get(id).cloned().unwrap();
        assert_eq!(message.content, "Part");
        assert_eq!(message.status, MessageStatus::Complete);
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert_eq!(controller.stats().cancelled, 1);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn external_cancel_through_handle() {
        let transport = Arc::new(ChannelTransport::new());
        let _tx = transport.push_stream();
        let mut controller = controller(&transport);

        let id = controller.submit("Hello").unwrap();
        controller.handle().unwrap().cancel();
        controller.run_until_idle().await.unwrap();
        assert_eq!(
            controller.messages().get(id).unwrap().status,
            MessageStatus::Complete
        );
        assert_eq!(controller.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn drop_cancels_live_stream() {
        let transport = Arc::new(ChannelTransport::new());
        let tx = transport.push_stream();
        let mut controller = controller(&transport);

        controller.submit("Hello").unwrap();
        tx.unbounded_send(Ok(text("Hi"))).unwrap();
        controller.pump().await.unwrap();
        let handle = controller.handle().unwrap();
        drop(controller);

        assert!(handle.is_cancelled());
        while !tx.is_closed() {
            tokio::task::yield_now().await;
        }
    }
}
