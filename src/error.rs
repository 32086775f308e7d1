//! Error types for streamchat.
//!
//! Transport and decode failures are caught at the stream consumer boundary and
//! surface to the controller as a terminal `Error(reason)` event; the remaining
//! variants are returned directly from the message log, the controller, and the
//! HTTP client.

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

use crate::types::MessageId;

type Source = Arc<dyn error::Error + Send + Sync>;

/// The main error type for streamchat.
#[derive(Clone, Debug)]
pub enum Error {
    /// The chat endpoint answered with a non-success status.
    Status {
        /// HTTP status code.
        status_code: u16,
        /// The endpoint's explanation, or the raw body when it gave none.
        message: String,
        /// Seconds to wait before retrying, from `retry-after`.
        retry_after: Option<u64>,
    },

    /// The endpoint could not be reached.
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// The connection or the request timed out.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// The HTTP client failed outside of connecting.
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Source>,
    },

    /// The response body failed mid-stream.
    Streaming {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Source>,
    },

    /// The response body held a malformed stream part or invalid UTF-8.
    Decode {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Source>,
    },

    /// The message log has no such message, or it is no longer streaming.
    MessageNotFound {
        /// The message that was addressed.
        id: MessageId,
        /// Human-readable error message.
        message: String,
    },

    /// A caller broke one of the message log's rules, e.g. by opening a second
    /// streaming message.  Unreachable through the controller.
    InvariantViolation {
        /// Human-readable error message.
        message: String,
    },

    /// Invalid input, such as an empty prompt or a malformed header.
    Validation {
        /// Human-readable error message.
        message: String,
        /// Parameter that failed validation.
        param: Option<String>,
    },

    /// A URL parsing error.
    Url {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },
}

impl Error {
    /// Creates an error for a non-success HTTP status.
    pub fn status(status_code: u16, message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::Status {
            status_code,
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new streaming error.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new decode error.
    pub fn decode(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Decode {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates an error for a message the log cannot update.
    pub fn message_not_found(id: MessageId, message: impl Into<String>) -> Self {
        Error::MessageNotFound {
            id,
            message: message.into(),
        }
    }

    /// Creates a new invariant violation.
    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Error::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    /// Returns true if the endpoint or the message log could not find what was asked for.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Status {
                status_code: 404,
                ..
            } | Error::MessageNotFound { .. }
        )
    }

    /// Returns true if the endpoint asked us to slow down.
    pub fn is_rate_limit(&self) -> bool {
        self.status_code() == Some(429)
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// Returns true if this error came from the transport: the connection, the HTTP
    /// client, or a non-success status.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Status { .. }
                | Error::Connection { .. }
                | Error::Timeout { .. }
                | Error::HttpClient { .. }
                | Error::Streaming { .. }
        )
    }

    /// Returns true if this error came from decoding a malformed stream payload.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }

    /// Returns true if this error is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Returns true if this error is an invariant violation.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::InvariantViolation { .. })
    }

    /// Returns true if sending the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Status { status_code, .. } => {
                matches!(status_code, 408 | 409 | 429 | 500..=599)
            }
            Error::Timeout { .. } | Error::Connection { .. } => true,
            _ => false,
        }
    }

    /// Returns the HTTP status behind this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

fn status_label(status_code: u16) -> &'static str {
    match status_code {
        400 => "Bad request",
        401 => "Authentication error",
        403 => "Permission error",
        404 => "Endpoint not found",
        429 => "Rate limit exceeded",
        500 => "Internal server error",
        502..=504 => "Service unavailable",
        _ => "HTTP error",
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Status {
                status_code,
                message,
                retry_after,
            } => {
                write!(f, "{} ({status_code}): {message}", status_label(*status_code))?;
                if let Some(retry_after) = retry_after {
                    write!(f, " (retry after {retry_after} seconds)")?;
                }
                Ok(())
            }
            Error::Connection { message, .. } => write!(f, "Connection error: {message}"),
            Error::Timeout { message, duration } => match duration {
                Some(duration) => write!(f, "Timeout error: {message} ({duration} seconds)"),
                None => write!(f, "Timeout error: {message}"),
            },
            Error::HttpClient { message, .. } => write!(f, "HTTP client error: {message}"),
            Error::Streaming { message, .. } => write!(f, "Streaming error: {message}"),
            Error::Decode { message, .. } => write!(f, "Decode error: {message}"),
            Error::MessageNotFound { id, message } => {
                write!(f, "Message {id} not updatable: {message}")
            }
            Error::InvariantViolation { message } => write!(f, "Invariant violation: {message}"),
            Error::Validation { message, param } => match param {
                Some(param) => write!(f, "Validation error: {message} (parameter: {param})"),
                None => write!(f, "Validation error: {message}"),
            },
            Error::Url { message, .. } => write!(f, "URL error: {message}"),
            Error::Io { message, .. } => write!(f, "I/O error: {message}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Streaming { source, .. }
            | Error::Decode { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: Arc::new(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::decode(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Url {
            message: format!("URL parse error: {err}"),
            source: Some(err),
        }
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::decode(format!("UTF-8 error: {err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for streamchat operations.
pub type Result<T> = std::result::Result<T, Error>;
