//! The seam between the stream consumer and whatever performs the HTTP call.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use futures::Stream;
use futures::channel::mpsc;

use crate::error::{Error, Result};
use crate::types::{ChatRequest, StreamPart};

/// A decoded response body.
pub type PartStream = Pin<Box<dyn Stream<Item = Result<StreamPart>> + Send>>;

/// Opens chat requests.
///
/// Dropping the returned stream must release the underlying connection; the
/// stream consumer relies on this to close the transport when a handle is
/// cancelled.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the decoded response body once the response
    /// headers have arrived.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the connection fails or the endpoint answers
    /// with a non-success status.
    async fn open(&self, request: &ChatRequest) -> Result<PartStream>;
}

/// Sending half of a stream scripted through [`ChannelTransport`].
pub type PartSender = mpsc::UnboundedSender<Result<StreamPart>>;

/// A transport whose responses are fed by hand.
///
/// Each call to [`Transport::open`] takes the next scripted response in order.
/// A scripted stream ends when its [`PartSender`] is dropped, and
/// [`PartSender::is_closed`] reports whether the consumer has hung up.  This
/// makes it useful for exercising render layers and controllers without a
/// backend.
#[derive(Default)]
pub struct ChannelTransport {
    scripted: Mutex<VecDeque<Result<mpsc::UnboundedReceiver<Result<StreamPart>>>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ChannelTransport {
    /// Creates a transport with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next response and returns the sender that feeds it.
    pub fn push_stream(&self) -> PartSender {
        let (tx, rx) = mpsc::unbounded();
        self.lock_scripted().push_back(Ok(rx));
        tx
    }

    /// Scripts the next response as a complete list of parts.
    pub fn push_parts(&self, parts: impl IntoIterator<Item = StreamPart>) {
        let tx = self.push_stream();
        for part in parts {
            // The receiver is queued above and cannot be gone yet.
            let _ = tx.unbounded_send(Ok(part));
        }
    }

    /// Scripts the next call to fail before any response body arrives.
    pub fn push_failure(&self, error: Error) {
        self.lock_scripted().push_back(Err(error));
    }

    /// Returns every request opened so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_scripted(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<mpsc::UnboundedReceiver<Result<StreamPart>>>>>
    {
        self.scripted.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn open(&self, request: &ChatRequest) -> Result<PartStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        let scripted = self.lock_scripted().pop_front();
        match scripted {
            Some(Ok(rx)) => Ok(Box::pin(rx)),
            Some(Err(err)) => Err(err),
            None => Err(Error::connection("no scripted response available", None)),
        }
    }
}
