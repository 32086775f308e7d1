use crate::types::Finish;

/// What a stream handle reports to its owner.
///
/// A handle produces zero or more `Chunk`s followed by exactly one terminal
/// event: `Done`, `Error`, or `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An increment of assistant text, in the order it was received.
    Chunk(String),

    /// The response completed.  Carries the last finish part seen, if any.
    Done(Option<Finish>),

    /// The transport failed or the payload could not be decoded.
    Error(String),

    /// The handle was cancelled.
    Cancelled,
}

impl StreamEvent {
    /// Returns true for `Done`, `Error`, and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events() {
        assert!(!StreamEvent::Chunk("Hi".to_string()).is_terminal());
        assert!(StreamEvent::Done(None).is_terminal());
        assert!(StreamEvent::Error("boom".to_string()).is_terminal());
        assert!(StreamEvent::Cancelled.is_terminal());
    }
}
