//! Logging hook for chat client traffic.
//!
//! This module provides the [`ChatLogger`] trait that lets callers record every
//! request sent through a [`ChatClient`](crate::ChatClient) and every part
//! decoded from its responses.

use crate::{ChatRequest, Error, StreamPart};

/// A trait for logging chat client operations.
///
/// # Example
///
/// ```rust,ignore
/// use streamchat::{ChatLogger, ChatRequest, Error, StreamPart};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ChatLogger for FileLogger {
///     fn log_request(&self, request: &ChatRequest) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Request: {}", serde_json::to_string(request).unwrap()).unwrap();
///     }
///
///     fn log_part(&self, part: &StreamPart) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Part: {part:?}").unwrap();
///     }
///
///     fn log_error(&self, error: &Error) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Error: {error}").unwrap();
///     }
/// }
/// ```
pub trait ChatLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, request: &ChatRequest);

    /// Log one decoded part of a response body.
    ///
    /// Called in arrival order, including for parts the session ignores.
    fn log_part(&self, part: &StreamPart);

    /// Log a failed request or a failure while reading the response body.
    fn log_error(&self, error: &Error);
}
