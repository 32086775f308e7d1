use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::chat::ChatConfig;
use crate::chat_logger::ChatLogger;
use crate::data_stream::decode_protocol;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_HEADERS_LATENCY, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::transport::{PartStream, Transport};
use crate::types::{ChatRequest, StreamProtocol};

/// The endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/api/chat";

/// Applies to establishing the connection only; a response body may stream for
/// as long as the endpoint keeps it open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for a streaming chat endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: ReqwestClient,
    endpoint: Url,
    protocol: StreamProtocol,
    timeout: Duration,
    headers: HeaderMap,
    body_fields: Map<String, Value>,
    logger: Option<Arc<dyn ChatLogger>>,
}

impl ChatClient {
    /// Create a new client for `endpoint` using the data stream protocol.
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_options(endpoint, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        endpoint: &str,
        protocol: Option<StreamProtocol>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::validation(
                format!("unsupported endpoint scheme: {}", endpoint.scheme()),
                Some("endpoint".to_string()),
            ));
        }

        let timeout = timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            protocol: protocol.unwrap_or_default(),
            timeout,
            headers: HeaderMap::new(),
            body_fields: Map::new(),
            logger: None,
        })
    }

    /// Create a client from a resolved chat configuration.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let mut client =
            Self::with_options(&config.endpoint, Some(config.protocol), Some(config.timeout))?;
        for (name, value) in &config.headers {
            client = client.with_header(name, value)?;
        }
        Ok(client)
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            Error::validation(format!("invalid header name {name:?}: {e}"), None)
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            Error::validation(format!("invalid value for header {name}: {e}"), None)
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a top-level body field sent with every request.  Fields already set
    /// on a request take precedence.
    pub fn with_body_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.body_fields.insert(key.into(), value);
        self
    }

    /// Attaches a logger that observes every request and decoded part.
    pub fn with_logger(mut self, logger: Arc<dyn ChatLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The configured endpoint, without the protocol query parameter.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The framing requested from the endpoint.
    pub fn protocol(&self) -> StreamProtocol {
        self.protocol
    }

    /// The connect timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The URL requests are POSTed to.
    pub fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "protocol")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("protocol", self.protocol.as_str());
        url
    }

    /// Create and return default headers for chat requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }

    fn prepare(&self, request: &ChatRequest) -> ChatRequest {
        let mut request = request.clone();
        for (key, value) in &self.body_fields {
            request
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        request
    }

    /// Process error responses and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        // FastAPI-style `{"detail": ..}`, OpenAI-style `{"error": {"message": ..}}`,
        // or a bare `{"message": ..}`.
        #[derive(Deserialize)]
        struct ErrorResponse {
            detail: Option<Value>,
            error: Option<ErrorDetail>,
            message: Option<String>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let parsed = serde_json::from_str::<ErrorResponse>(&error_body).ok();
        let error_message = parsed
            .and_then(|e| {
                e.detail
                    .map(|detail| match detail {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .or_else(|| e.error.and_then(|d| d.message))
                    .or(e.message)
            })
            .unwrap_or_else(|| {
                if error_body.trim().is_empty() {
                    format!("HTTP status {status_code}")
                } else {
                    error_body.clone()
                }
            });

        match status_code {
            408 => Error::timeout(error_message, None),
            _ => Error::status(status_code, error_message, retry_after),
        }
    }

    /// Send a chat request and return its response body as decoded parts.
    ///
    /// Resolves once the response headers arrive.  Dropping the returned stream
    /// closes the connection.
    pub async fn stream(&self, request: &ChatRequest) -> Result<PartStream> {
        CLIENT_REQUESTS.click();
        let request = self.prepare(request);
        if let Some(logger) = &self.logger {
            logger.log_request(&request);
        }

        let started = Instant::now();
        let response = self
            .client
            .post(self.request_url())
            .headers(self.default_headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            });
        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                let err = Self::process_error_response(response).await;
                return self.fail(err);
            }
            Err(err) => return self.fail(err),
        };
        CLIENT_HEADERS_LATENCY.add(started.elapsed().as_secs_f64());

        let bytes = response.bytes_stream().map(|result| {
            result
                .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
        });
        let parts = decode_protocol(bytes, self.protocol);

        match self.logger.clone() {
            Some(logger) => Ok(Box::pin(parts.inspect(move |item| match item {
                Ok(part) => logger.log_part(part),
                Err(err) => logger.log_error(err),
            }))),
            None => Ok(parts),
        }
    }

    fn fail<T>(&self, err: Error) -> Result<T> {
        CLIENT_REQUEST_ERRORS.click();
        if let Some(logger) = &self.logger {
            logger.log_error(&err);
        }
        Err(err)
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("protocol", &self.protocol)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("body_fields", &self.body_fields)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl Transport for ChatClient {
    async fn open(&self, request: &ChatRequest) -> Result<PartStream> {
        self.stream(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = ChatClient::new(DEFAULT_ENDPOINT).unwrap();
        assert_eq!(client.endpoint().as_str(), DEFAULT_ENDPOINT);
        assert_eq!(client.protocol(), StreamProtocol::Data);
        assert_eq!(client.timeout(), DEFAULT_CONNECT_TIMEOUT);

        let client = ChatClient::with_options(
            "https://chat.example.com/api/chat",
            Some(StreamProtocol::Text),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(client.protocol(), StreamProtocol::Text);
        assert_eq!(client.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_endpoints() {
        assert!(matches!(
            ChatClient::new("not a url").unwrap_err(),
            Error::Url { .. }
        ));
        assert!(ChatClient::new("ftp://example.com/chat")
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn request_url_carries_protocol() {
        let client = ChatClient::new("http://localhost:8000/api/chat?protocol=text&v=1").unwrap();
        assert_eq!(
            client.request_url().as_str(),
            "http://localhost:8000/api/chat?v=1&protocol=data"
        );
    }

    #[test]
    fn headers_and_body_fields() {
        let client = ChatClient::new(DEFAULT_ENDPOINT)
            .unwrap()
            .with_header("x-session", "abc")
            .unwrap()
            .with_body_field("id", json!("chat-1"))
            .with_body_field("model", json!("small"));
        let headers = client.default_headers();
        assert_eq!(headers.get("x-session").unwrap(), "abc");
        assert_eq!(headers.get(header::ACCEPT).unwrap(), "text/event-stream");

        let request = ChatRequest::new(Vec::new(), "Hello").with_field("model", json!("large"));
        let prepared = client.prepare(&request);
        assert_eq!(prepared.extra.get("id"), Some(&json!("chat-1")));
        assert_eq!(prepared.extra.get("model"), Some(&json!("large")));

        assert!(
            ChatClient::new(DEFAULT_ENDPOINT)
                .unwrap()
                .with_header("bad header", "x")
                .unwrap_err()
                .is_validation()
        );
    }
}
