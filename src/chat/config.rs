//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_ENDPOINT};
use crate::error::{Error, Result};
use crate::types::StreamProtocol;

/// Environment variable consulted by the binary when `--endpoint` is absent.
pub const ENDPOINT_ENV: &str = "STREAMCHAT_ENDPOINT";

/// Command-line arguments for the streamchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Chat endpoint URL.
    #[arrrg(optional, "Chat endpoint (default: http://localhost:8000/api/chat)", "URL")]
    pub endpoint: Option<String>,

    /// Response framing.
    #[arrrg(optional, "Stream protocol: data or text (default: data)", "PROTOCOL")]
    pub protocol: Option<String>,

    /// Connect timeout in seconds.
    #[arrrg(optional, "Connect timeout in seconds (default: 60)", "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Extra request headers.
    #[arrrg(optional, "Extra headers as name=value,name=value", "HEADERS")]
    pub headers: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// The chat endpoint URL.
    pub endpoint: String,

    /// The framing requested from the endpoint.
    pub protocol: StreamProtocol,

    /// Connect timeout for each request.
    pub timeout: Duration,

    /// Extra headers sent with every request, in order.
    pub headers: Vec<(String, String)>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Endpoint: http://localhost:8000/api/chat
    /// - Protocol: data
    /// - Timeout: 60 seconds
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            protocol: StreamProtocol::Data,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            headers: Vec::new(),
            use_color: true,
        }
    }

    /// Sets the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the stream protocol.
    pub fn with_protocol(mut self, protocol: StreamProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let mut config = ChatConfig::new();
        if let Some(endpoint) = args.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(protocol) = args.protocol {
            config.protocol = protocol
                .parse()
                .map_err(|e: String| Error::validation(e, Some("protocol".to_string())))?;
        }
        if let Some(secs) = args.timeout_secs {
            if secs == 0 {
                return Err(Error::validation(
                    "timeout must be at least one second",
                    Some("timeout-secs".to_string()),
                ));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(headers) = args.headers {
            config.headers = parse_headers(&headers)?;
        }
        config.use_color = !args.no_color;
        Ok(config)
    }
}

/// Parses `name=value` pairs separated by commas.
///
/// # Errors
///
/// Returns a validation error for a pair without `=` or with an empty name.
pub fn parse_headers(input: &str) -> Result<Vec<(String, String)>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(Error::validation(
                format!("expected name=value, got {pair:?}"),
                Some("headers".to_string()),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.endpoint, "http://localhost:8000/api/chat");
        assert_eq!(config.protocol, StreamProtocol::Data);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.headers.is_empty());
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::try_from(ChatArgs::default()).unwrap();
        assert_eq!(config, ChatConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            endpoint: Some("https://chat.example.com/api/chat".to_string()),
            protocol: Some("text".to_string()),
            timeout_secs: Some(5),
            headers: Some("x-session=abc, x-trace = 1".to_string()),
            no_color: true,
        };
        let config = ChatConfig::try_from(args).unwrap();
        assert_eq!(config.endpoint, "https://chat.example.com/api/chat");
        assert_eq!(config.protocol, StreamProtocol::Text);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.headers,
            vec![
                ("x-session".to_string(), "abc".to_string()),
                ("x-trace".to_string(), "1".to_string()),
            ]
        );
        assert!(!config.use_color);
    }

    #[test]
    fn config_from_args_rejects_bad_values() {
        let bad_protocol = ChatArgs {
            protocol: Some("sse".to_string()),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::try_from(bad_protocol).is_err());

        let zero_timeout = ChatArgs {
            timeout_secs: Some(0),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::try_from(zero_timeout).unwrap_err().is_validation());

        let bad_headers = ChatArgs {
            headers: Some("novalue".to_string()),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::try_from(bad_headers).unwrap_err().is_validation());
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_endpoint("http://127.0.0.1:9000/chat")
            .with_protocol(StreamProtocol::Text)
            .with_timeout(Duration::from_secs(2))
            .with_header("authorization", "Bearer token")
            .without_color();

        assert_eq!(config.endpoint, "http://127.0.0.1:9000/chat");
        assert_eq!(config.protocol, StreamProtocol::Text);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.headers.len(), 1);
        assert!(!config.use_color);
    }

    #[test]
    fn header_parsing() {
        assert_eq!(parse_headers("").unwrap(), Vec::new());
        assert_eq!(
            parse_headers("a=1,,b=x=y").unwrap(),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x=y".to_string()),
            ]
        );
        assert!(parse_headers("=1").is_err());
    }
}
