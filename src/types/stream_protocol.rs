use std::fmt;
use std::str::FromStr;

/// How the chat endpoint frames its response body.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum StreamProtocol {
    /// Newline-delimited `<code>:<json>` parts.
    #[default]
    Data,

    /// Raw UTF-8 text; every byte of the body is answer text.
    Text,
}

impl StreamProtocol {
    /// The value sent in the `protocol` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Data => "data",
            StreamProtocol::Text => "text",
        }
    }
}

impl fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "data" => Ok(StreamProtocol::Data),
            "text" => Ok(StreamProtocol::Text),
            _ => Err(format!(
                "Invalid stream protocol: {s}. Valid options: data, text"
            )),
        }
    }
}
