//! The stream consumer: turns a chat request into a cancelable sequence of
//! [`StreamEvent`]s.
//!
//! Every handle started by a consumer reports into an [`EventSink`] shared with
//! its owner.  Events are tagged with the [`HandleId`] of the handle that
//! produced them so the owner can tell a live handle's events from a replaced
//! one's.  Each handle emits zero or more `Chunk`s followed by exactly one
//! terminal event.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::observability::{
    STREAM_BYTES, STREAM_CANCELLATIONS, STREAM_CHUNKS, STREAM_DURATION, STREAM_ERRORS,
    STREAM_TTFB, STREAMS_STARTED,
};
use crate::transport::Transport;
use crate::types::{ChatRequest, StreamEvent, StreamPart};

/// Identifies one stream handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Where handles deliver their events.
pub type EventSink = mpsc::UnboundedSender<(HandleId, StreamEvent)>;

/// Receiving half of an [`EventSink`].
pub type EventSource = mpsc::UnboundedReceiver<(HandleId, StreamEvent)>;

/// Creates a connected sink and source.
pub fn event_channel() -> (EventSink, EventSource) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Default)]
struct GateState {
    cancelled: bool,
    terminated: bool,
}

/// Serializes emission against cancellation.
///
/// Once `cancelled` is set no chunk passes the gate, and whatever terminal event
/// arrives first is reported as `Cancelled`.
#[derive(Debug)]
struct Gate {
    id: HandleId,
    sink: EventSink,
    token: CancellationToken,
    state: Mutex<GateState>,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel(&self) -> bool {
        let mut state = self.lock();
        if state.cancelled || state.terminated {
            return false;
        }
        state.cancelled = true;
        self.token.cancel();
        true
    }

    fn chunk(&self, text: String) -> bool {
        let state = self.lock();
        if state.cancelled || state.terminated {
            trace!(handle = %self.id, "dropping chunk after cancellation");
            return false;
        }
        self.send(StreamEvent::Chunk(text));
        true
    }

    fn terminate(&self, event: StreamEvent) {
        let mut state = self.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;
        let event = if state.cancelled {
            StreamEvent::Cancelled
        } else {
            event
        };
        match &event {
            StreamEvent::Cancelled => {
                STREAM_CANCELLATIONS.click();
                debug!(handle = %self.id, "stream cancelled");
            }
            StreamEvent::Error(reason) => {
                STREAM_ERRORS.click();
                warn!(handle = %self.id, reason = %reason, "stream failed");
            }
            StreamEvent::Done(finish) => {
                debug!(handle = %self.id, finish = ?finish, "stream done");
            }
            StreamEvent::Chunk(_) => {}
        }
        self.send(event);
    }

    fn send(&self, event: StreamEvent) {
        if self.sink.send((self.id, event)).is_err() {
            trace!(handle = %self.id, "event sink closed");
        }
    }
}

/// Emits an error terminal if the pump task goes away without reporting one.
struct TerminalGuard(Arc<Gate>);

impl TerminalGuard {
    fn finish(self, event: StreamEvent) {
        self.0.terminate(event);
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        self.0
            .terminate(StreamEvent::Error("stream ended unexpectedly".to_string()));
    }
}

/// A cancelable in-flight request.
///
/// Cloning a handle yields another reference to the same stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    gate: Arc<Gate>,
}

impl StreamHandle {
    /// The id attached to every event this handle emits.
    pub fn id(&self) -> HandleId {
        self.gate.id
    }

    /// Requests cancellation.
    ///
    /// After this returns no further `Chunk` is emitted and the handle's terminal
    /// event is `Cancelled`.  The transport stream is dropped, closing the
    /// connection, before that event is sent.  Returns false if the handle was
    /// already cancelled or had already terminated.
    pub fn cancel(&self) -> bool {
        self.gate.cancel()
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.gate.lock().cancelled
    }

    /// Returns true once the terminal event has been emitted.
    pub fn is_finished(&self) -> bool {
        self.gate.lock().terminated
    }
}

/// Starts streams against a [`Transport`].
pub struct StreamConsumer {
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    deadline: Option<Duration>,
}

impl StreamConsumer {
    /// Create a consumer for `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
            deadline: None,
        }
    }

    /// Cancel every stream that runs longer than `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The configured deadline, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Start streaming `request` and report its events into `sink`.
    ///
    /// The request is driven by a task spawned on the current Tokio runtime;
    /// this panics if called outside one.
    pub fn start(&self, request: ChatRequest, sink: EventSink) -> StreamHandle {
        let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let gate = Arc::new(Gate {
            id,
            sink,
            token: CancellationToken::new(),
            state: Mutex::new(GateState::default()),
        });
        STREAMS_STARTED.click();
        debug!(handle = %id, messages = request.messages.len(), "stream started");
        tokio::spawn(pump(
            Arc::clone(&gate),
            Arc::clone(&self.transport),
            request,
            self.deadline,
        ));
        StreamHandle { gate }
    }
}

impl fmt::Debug for StreamConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConsumer")
            .field("next_id", &self.next_id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

async fn pump(
    gate: Arc<Gate>,
    transport: Arc<dyn Transport>,
    request: ChatRequest,
    deadline: Option<Duration>,
) {
    let guard = TerminalGuard(Arc::clone(&gate));
    let started = Instant::now();
    // `drive` owns the transport stream; it is dropped by the time it returns.
    let terminal = drive(&gate, transport, request, deadline, started).await;
    STREAM_DURATION.add(started.elapsed().as_secs_f64());
    guard.finish(terminal);
}

async fn drive(
    gate: &Gate,
    transport: Arc<dyn Transport>,
    request: ChatRequest,
    deadline: Option<Duration>,
    started: Instant,
) -> StreamEvent {
    let token = gate.token.clone();
    let mut armed = deadline.is_some();
    let timer = tokio::time::sleep(deadline.unwrap_or_default());
    tokio::pin!(timer);

    let open = transport.open(&request);
    tokio::pin!(open);
    let mut parts = loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return StreamEvent::Cancelled,
            _ = &mut timer, if armed => {
                armed = false;
                debug!(handle = %gate.id, "deadline expired before response");
                gate.cancel();
            }
            opened = &mut open => match opened {
                Ok(parts) => break parts,
                Err(err) => return StreamEvent::Error(err.to_string()),
            },
        }
    };

    let mut first_chunk = true;
    let mut last_finish = None;
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return StreamEvent::Cancelled,
            _ = &mut timer, if armed => {
                armed = false;
                debug!(handle = %gate.id, "deadline expired mid-stream");
                gate.cancel();
            }
            part = parts.next() => match part {
                None => return StreamEvent::Done(last_finish),
                Some(Err(err)) => return StreamEvent::Error(err.to_string()),
                Some(Ok(StreamPart::Text(text))) => {
                    if !text.is_empty() {
                        if first_chunk {
                            first_chunk = false;
                            STREAM_TTFB.add(started.elapsed().as_secs_f64());
                        }
                        STREAM_CHUNKS.click();
                        STREAM_BYTES.count(text.len() as u64);
                        gate.chunk(text);
                    }
                }
                Some(Ok(StreamPart::Error(reason))) => return StreamEvent::Error(reason),
                Some(Ok(StreamPart::FinishStep(finish))) => last_finish = Some(finish),
                Some(Ok(StreamPart::FinishMessage(finish))) => {
                    return StreamEvent::Done(Some(finish));
                }
                Some(Ok(StreamPart::Other { code, .. })) => {
                    trace!(handle = %gate.id, code = %code, "ignoring stream part");
                }
            },
        }
    }
}
