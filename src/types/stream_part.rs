use crate::types::Finish;

/// One decoded frame of a chat response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    /// A text fragment of the assistant answer (`0:`).
    Text(String),

    /// The backend reported an error (`3:`).  Terminal.
    Error(String),

    /// One generation step finished (`e:`).  More steps may follow.
    FinishStep(Finish),

    /// The whole message finished (`d:`).  Explicit end marker.
    FinishMessage(Finish),

    /// A recognised part this client does not act on (data, annotations, tool
    /// calls, step starts, ...).
    Other {
        /// The single-character type code.
        code: char,
        /// The undecoded JSON payload.
        payload: String,
    },
}

impl StreamPart {
    /// Returns true if no further parts are expected after this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamPart::Error(_) | StreamPart::FinishMessage(_))
    }
}
