//! Decoding of chat response bodies.
//!
//! The chat endpoint frames its body one of two ways (see [`StreamProtocol`]):
//!
//! - **data**: newline-delimited `<code>:<json>` parts such as `0:"Hi"` for text,
//!   `3:"boom"` for an error, `e:{..}` when a step finishes and `d:{..}` when the
//!   message finishes.
//! - **text**: the body is the answer text itself.
//!
//! Both framings are implemented as [`Decoder`]s over a byte buffer, so a frame
//! or a UTF-8 sequence split across transport chunks is reassembled before it is
//! decoded.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tokio_util::codec::Decoder;

use crate::error::{Error, Result};
use crate::types::{Finish, StreamPart, StreamProtocol};

/// Part codes that are understood but carry nothing the chat session uses.
const IGNORED_CODES: &[char] = &[
    '2', '8', '9', 'a', 'b', 'c', 'f', 'g', 'h', 'i', 'j', 'k',
];

/// Decoder for the line-oriented data stream protocol.
#[derive(Debug, Default)]
pub struct DataStreamCodec {
    // Bytes of `src` already scanned for a newline.
    scanned: usize,
}

impl DataStreamCodec {
    /// Creates a new codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for DataStreamCodec {
    type Item = StreamPart;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StreamPart>> {
        loop {
            let start = self.scanned.min(src.len());
            let Some(offset) = src[start..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                return Ok(None);
            };
            let line = src.split_to(start + offset + 1);
            self.scanned = 0;
            let line = trim_line_end(&line);
            if line.is_empty() {
                continue;
            }
            return parse_line(line).map(Some);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<StreamPart>> {
        if let Some(part) = self.decode(src)? {
            return Ok(Some(part));
        }
        self.scanned = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let line = src.split();
        let line = trim_line_end(&line);
        if line.is_empty() {
            return Ok(None);
        }
        parse_line(line).map(Some)
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Parse a single `<code>:<json>` line.
fn parse_line(line: &[u8]) -> Result<StreamPart> {
    let line = std::str::from_utf8(line)?;
    let Some((code, payload)) = line.split_once(':') else {
        return Err(Error::decode(
            format!("Malformed stream part: missing ':' separator in '{line}'"),
            None,
        ));
    };
    let mut chars = code.chars();
    let (Some(code), None) = (chars.next(), chars.next()) else {
        return Err(Error::decode(
            format!("Malformed stream part: invalid type code '{code}'"),
            None,
        ));
    };

    match code {
        '0' => Ok(StreamPart::Text(serde_json::from_str::<String>(payload)?)),
        '3' => Ok(StreamPart::Error(serde_json::from_str::<String>(payload)?)),
        'e' => Ok(StreamPart::FinishStep(serde_json::from_str::<Finish>(
            payload,
        )?)),
        'd' => Ok(StreamPart::FinishMessage(serde_json::from_str::<Finish>(
            payload,
        )?)),
        code if IGNORED_CODES.contains(&code) => Ok(StreamPart::Other {
            code,
            payload: payload.to_string(),
        }),
        _ => Err(Error::decode(
            format!("Unknown stream part type: {code}"),
            None,
        )),
    }
}

/// Decoder for raw text bodies.
///
/// Emits every complete UTF-8 prefix of the buffer as one text part and keeps an
/// incomplete trailing sequence for the next read.
#[derive(Debug, Default)]
pub struct TextStreamCodec;

impl TextStreamCodec {
    /// Creates a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TextStreamCodec {
    type Item = StreamPart;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StreamPart>> {
        if src.is_empty() {
            return Ok(None);
        }
        let valid = match std::str::from_utf8(src) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_some() => {
                src.clear();
                return Err(Error::decode(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                ));
            }
            Err(e) => e.valid_up_to(),
        };
        if valid == 0 {
            return Ok(None);
        }
        let text = src.split_to(valid);
        // Already validated, so the lossy conversion never substitutes.
        let text = String::from_utf8_lossy(&text).into_owned();
        Ok(Some(StreamPart::Text(text)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<StreamPart>> {
        if let Some(part) = self.decode(src)? {
            return Ok(Some(part));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let remaining = src.len();
        src.clear();
        Err(Error::decode(
            format!("Stream ended inside a UTF-8 sequence ({remaining} bytes left over)"),
            None,
        ))
    }
}

/// Decode a stream of body bytes into stream parts.
///
/// A transport error is yielded once and ends the stream.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use futures::{StreamExt, stream};
/// use streamchat::{DataStreamCodec, StreamPart, decode_stream};
///
/// # tokio_test::block_on(async {
/// let body = stream::iter(vec![
///     Ok(Bytes::from_static(b"0:\"Hi\"\n0:\" th")),
///     Ok(Bytes::from_static(b"ere\"\n")),
/// ]);
/// let parts: Vec<_> = decode_stream(body, DataStreamCodec::new()).collect().await;
/// assert_eq!(parts.len(), 2);
/// assert_eq!(parts[1].as_ref().unwrap(), &StreamPart::Text(" there".to_string()));
/// # });
/// ```
pub fn decode_stream<S, D>(byte_stream: S, codec: D) -> impl Stream<Item = Result<StreamPart>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
    D: Decoder<Item = StreamPart, Error = Error>,
{
    let state = DecodeState {
        stream: byte_stream,
        codec,
        buffer: BytesMut::new(),
        eof: false,
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        loop {
            if state.eof {
                return match state.codec.decode_eof(&mut state.buffer) {
                    Ok(Some(part)) => Some((Ok(part), state)),
                    Ok(None) => None,
                    Err(e) => {
                        state.failed = true;
                        Some((Err(e), state))
                    }
                };
            }

            // First check if we have a complete part in the buffer
            match state.codec.decode(&mut state.buffer) {
                Ok(Some(part)) => return Some((Ok(part), state)),
                Ok(None) => {}
                Err(e) => return Some((Err(e), state)),
            }

            // Read more data
            match state.stream.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
                None => state.eof = true,
            }
        }
    })
}

/// Decode a stream of body bytes using the framing of `protocol`.
pub fn decode_protocol<S>(
    byte_stream: S,
    protocol: StreamProtocol,
) -> std::pin::Pin<Box<dyn Stream<Item = Result<StreamPart>> + Send>>
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send + 'static,
{
    match protocol {
        StreamProtocol::Data => Box::pin(decode_stream(byte_stream, DataStreamCodec::new())),
        StreamProtocol::Text => Box::pin(decode_stream(byte_stream, TextStreamCodec::new())),
    }
}

struct DecodeState<S, D> {
    stream: S,
    codec: D,
    buffer: BytesMut,
    eof: bool,
    failed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FinishReason, Usage};

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes>> + Unpin + Send + 'static {
        let owned: Vec<Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(owned)
    }

    async fn collect(
        byte_stream: impl Stream<Item = Result<Bytes>> + Unpin + Send + 'static,
        protocol: StreamProtocol,
    ) -> Vec<Result<StreamPart>> {
        decode_protocol(byte_stream, protocol).collect().await
    }

    #[tokio::test]
    async fn parse_text_parts() {
        let parts = collect(
            chunks(&[b"0:\"Hi\"\n0:\" there\"\n0:\"!\"\n"]),
            StreamProtocol::Data,
        )
        .await;
        let parts: Vec<StreamPart> = parts.into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(
            parts,
            vec![
                StreamPart::Text("Hi".to_string()),
                StreamPart::Text(" there".to_string()),
                StreamPart::Text("!".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn parse_finish_parts() {
        let parts = collect(
            chunks(&[
                b"0:\"ok\"\ne:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":3,\"completionTokens\":1},\"isContinued\":false}\n",
                b"d:{\"finishReason\":\"length\"}\n",
            ]),
            StreamProtocol::Data,
        )
        .await;
        assert_eq!(parts.len(), 3);
        match parts[1].as_ref().unwrap() {
            StreamPart::FinishStep(finish) => {
                assert_eq!(finish.finish_reason, FinishReason::Stop);
                assert_eq!(finish.usage, Some(Usage::new(3, 1)));
            }
            other => panic!("unexpected part {other:?}"),
        }
        match parts[2].as_ref().unwrap() {
            StreamPart::FinishMessage(finish) => {
                assert_eq!(finish.finish_reason, FinishReason::Length);
                assert!(parts[2].as_ref().unwrap().is_terminal());
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[tokio::test]
    async fn handle_split_part() {
        let parts = collect(
            chunks(&[b"0:\"Hel", b"lo\"", b"\n0:", b"\"!\"\n"]),
            StreamProtocol::Data,
        )
        .await;
        let parts: Vec<StreamPart> = parts.into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(
            parts,
            vec![
                StreamPart::Text("Hello".to_string()),
                StreamPart::Text("!".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn handle_split_utf8_sequence() {
        let line = "0:\"caf\u{e9} \u{1f600}\"\n".as_bytes();
        let (head, tail) = line.split_at(line.len() - 4);
        let parts = collect(chunks(&[head, tail]), StreamProtocol::Data).await;
        assert_eq!(
            parts.into_iter().map(|p| p.unwrap()).collect::<Vec<_>>(),
            vec![StreamPart::Text("caf\u{e9} \u{1f600}".to_string())]
        );
    }

    #[tokio::test]
    async fn trailing_line_without_newline() {
        let parts = collect(chunks(&[b"0:\"a\"\r\n\n0:\"b\""]), StreamProtocol::Data).await;
        assert_eq!(
            parts.into_iter().map(|p| p.unwrap()).collect::<Vec<_>>(),
            vec![
                StreamPart::Text("a".to_string()),
                StreamPart::Text("b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn ignored_and_error_parts() {
        let parts = collect(
            chunks(&[b"f:{\"messageId\":\"m1\"}\n2:[{\"k\":1}]\n3:\"model overloaded\"\n"]),
            StreamProtocol::Data,
        )
        .await;
        let parts: Vec<StreamPart> = parts.into_iter().map(|p| p.unwrap()).collect();
        assert!(matches!(parts[0], StreamPart::Other { code: 'f', .. }));
        assert!(matches!(parts[1], StreamPart::Other { code: '2', .. }));
        assert_eq!(parts[2], StreamPart::Error("model overloaded".to_string()));
    }

    #[tokio::test]
    async fn malformed_parts_are_decode_errors() {
        let parts = collect(
            chunks(&[b"no separator here\nz:\"?\"\n0:not-json\n0:\"fine\"\n"]),
            StreamProtocol::Data,
        )
        .await;
        assert_eq!(parts.len(), 4);
        assert!(parts[0].as_ref().unwrap_err().is_decode());
        let unknown = parts[1].as_ref().unwrap_err();
        assert!(unknown.to_string().contains("Unknown stream part type"));
        assert!(parts[2].as_ref().unwrap_err().is_decode());
        assert_eq!(
            parts[3].as_ref().unwrap(),
            &StreamPart::Text("fine".to_string())
        );
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let byte_stream = stream::iter(vec![
            Ok(Bytes::from_static(b"0:\"Sure, \"\n")),
            Err(Error::streaming("connection reset", None)),
            Ok(Bytes::from_static(b"0:\"never\"\n")),
        ]);
        let parts = collect(byte_stream, StreamProtocol::Data).await;
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0].as_ref().unwrap(),
            &StreamPart::Text("Sure, ".to_string())
        );
        assert!(parts[1].as_ref().unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn empty_body_yields_nothing() {
        let parts = collect(chunks(&[]), StreamProtocol::Data).await;
        assert!(parts.is_empty());
    }

    #[tokio::test]
    async fn text_protocol_passes_through() {
        let smile = "\u{1f600}".as_bytes();
        let parts = collect(
            chunks(&[b"Hi th", b"ere ", &smile[..2], &smile[2..]]),
            StreamProtocol::Text,
        )
        .await;
        let text: String = parts
            .into_iter()
            .map(|p| match p.unwrap() {
                StreamPart::Text(t) => t,
                other => panic!("unexpected part {other:?}"),
            })
            .collect();
        assert_eq!(text, "Hi there \u{1f600}");
    }

    #[tokio::test]
    async fn text_protocol_truncated_sequence() {
        let smile = "\u{1f600}".as_bytes();
        let parts = collect(chunks(&[b"ok ", &smile[..2]]), StreamProtocol::Text).await;
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0].as_ref().unwrap(),
            &StreamPart::Text("ok ".to_string())
        );
        assert!(parts[1].as_ref().unwrap_err().is_decode());
    }

    #[tokio::test]
    async fn text_protocol_invalid_bytes() {
        let parts = collect(chunks(&[b"\xff\xfe"]), StreamProtocol::Text).await;
        assert_eq!(parts.len(), 1);
        assert!(parts[0].as_ref().unwrap_err().is_decode());
    }
}
