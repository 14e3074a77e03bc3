use std::mem;
use std::ops::Deref;

use serde_json::Value;

use crate::error::{Error, Failure, Result};
use crate::headers::Headers;
use crate::request::Request;
use crate::settings::Config;
use crate::timeout::with_timeout;
use crate::transport::{Transport, TransportEvent};

/// A received HTTP response
///
/// The final response of a redirect-following interaction owns the whole
/// chain: `history` holds the completed earlier hops, oldest first, and is
/// empty on every response except the last. Dropping the final response
/// releases all of its predecessors.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Parsed status code, `0` when no status line was received
    pub status_code: u16,
    /// The raw status line, empty when none was received
    pub response_line: String,
    /// Version token of the status line, e.g. `HTTP/1.1`
    pub http_version: String,
    /// Response headers in arrival order
    pub headers: Headers,
    /// Body bytes, subject to `http/ignore_body`
    pub body: Vec<u8>,
    /// The request that produced this response
    pub request: Request,
    history: Vec<Response>,
}

impl Response {
    /// Check whether the status is a redirect (3xx)
    pub fn is_redirect(&self) -> bool {
        self.status_code / 100 == 3
    }

    /// The response immediately preceding this one in the redirect chain
    pub fn previous(&self) -> Option<Previous<'_>> {
        let (response, earlier) = self.history.split_last()?;
        Some(Previous { response, earlier })
    }

    /// Completed earlier hops, oldest first
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    pub(crate) fn set_history(&mut self, history: Vec<Response>) {
        self.history = history;
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }
}

/// Cursor over the redirect chain, one hop back from its owner
///
/// Dereferences to the earlier [`Response`]; `previous()` steps further
/// back and returns `None` at the oldest hop.
#[derive(Debug, Clone, Copy)]
pub struct Previous<'a> {
    response: &'a Response,
    earlier: &'a [Response],
}

impl<'a> Previous<'a> {
    /// Step one hop further back in the chain
    pub fn previous(&self) -> Option<Previous<'a>> {
        let (response, earlier) = self.earlier.split_last()?;
        Some(Previous { response, earlier })
    }

    /// The response this cursor points at
    pub fn get(&self) -> &'a Response {
        self.response
    }
}

impl Deref for Previous<'_> {
    type Target = Response;

    fn deref(&self) -> &Response {
        self.response
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    StatusLine,
    Headers,
    Body,
    Complete,
}

#[derive(Debug, Clone, Copy)]
enum BodyMode {
    ContentLength(usize),
    Chunked,
    UntilEof,
}

#[derive(Debug, Clone, Copy)]
enum ChunkPhase {
    Size,
    Data(usize),
    DataEnd,
    Trailers,
}

/// Incremental response parser
///
/// Consumes bytes in arbitrarily-sized chunks, buffering partial lines
/// across feeds: `StatusLine → Headers → Body → Complete`. Body framing
/// precedence is `Content-Length`, then chunked transfer coding, then
/// close-delimited (EOF terminates the body successfully once the status
/// line has been parsed).
pub struct ResponseParser {
    phase: Phase,
    body_mode: BodyMode,
    chunk_phase: ChunkPhase,
    buffer: Vec<u8>,
    response: Response,
    ignore_body: bool,
}

impl ResponseParser {
    /// Create a parser awaiting the status line
    pub fn new(ignore_body: bool) -> Self {
        Self {
            phase: Phase::StatusLine,
            body_mode: BodyMode::UntilEof,
            chunk_phase: ChunkPhase::Size,
            buffer: Vec::new(),
            response: Response::default(),
            ignore_body,
        }
    }

    /// Feed a chunk of received bytes
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        self.advance()
    }

    /// Check whether a full response has been parsed
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Take the completed response
    pub fn finish(&mut self) -> Response {
        mem::take(&mut self.response)
    }

    /// Take whatever was accumulated so far
    pub fn take_partial(&mut self) -> Response {
        mem::take(&mut self.response)
    }

    /// Resolve an end-of-stream event
    ///
    /// EOF completes a close-delimited body; anywhere else in the state
    /// machine it is a truncation and fails with [`Error::Eof`].
    pub fn finish_on_eof(&mut self) -> Result<Response> {
        match (self.phase, self.body_mode) {
            (Phase::Complete, _) => Ok(self.finish()),
            (Phase::Body, BodyMode::UntilEof) => {
                self.phase = Phase::Complete;
                Ok(self.finish())
            }
            _ => Err(Error::Eof),
        }
    }

    fn advance(&mut self) -> Result<()> {
        loop {
            let progressed = match self.phase {
                Phase::StatusLine => self.advance_status_line()?,
                Phase::Headers => self.advance_headers()?,
                Phase::Body => self.advance_body()?,
                Phase::Complete => false,
            };
            if !progressed {
                return Ok(());
            }
        }
    }

    fn advance_status_line(&mut self) -> Result<bool> {
        let Some(line) = self.take_line() else {
            return Ok(false);
        };
        let mut tokens = line.split_whitespace();
        let version = tokens
            .next()
            .filter(|v| v.starts_with("HTTP/"))
            .ok_or_else(|| Error::response_parse("malformed status line"))?;
        let status = tokens
            .next()
            .and_then(|t| t.parse::<u16>().ok())
            .ok_or_else(|| Error::response_parse("malformed status line"))?;
        self.response.http_version = version.to_string();
        self.response.status_code = status;
        self.response.response_line = line;
        self.phase = Phase::Headers;
        Ok(true)
    }

    fn advance_headers(&mut self) -> Result<bool> {
        let Some(line) = self.take_line() else {
            return Ok(false);
        };
        if line.is_empty() {
            self.begin_body()?;
            return Ok(true);
        }
        let (name, value) = parse_header_line(&line)?;
        self.response.headers.append(name, value);
        Ok(true)
    }

    fn begin_body(&mut self) -> Result<()> {
        let status = self.response.status_code;
        if status / 100 == 1 || status == 204 || status == 304 {
            self.phase = Phase::Complete;
            return Ok(());
        }
        if let Some(value) = self.response.headers.get("Content-Length") {
            let length = value
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::response_parse("invalid content-length"))?;
            if length == 0 {
                self.phase = Phase::Complete;
            } else {
                self.body_mode = BodyMode::ContentLength(length);
                self.phase = Phase::Body;
            }
            return Ok(());
        }
        let chunked = self
            .response
            .headers
            .get("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
        if chunked {
            self.body_mode = BodyMode::Chunked;
            self.chunk_phase = ChunkPhase::Size;
        } else {
            self.body_mode = BodyMode::UntilEof;
        }
        self.phase = Phase::Body;
        Ok(())
    }

    fn advance_body(&mut self) -> Result<bool> {
        match self.body_mode {
            BodyMode::ContentLength(remaining) => {
                if self.buffer.is_empty() {
                    return Ok(false);
                }
                let taken = self.consume_body(remaining);
                if remaining == taken {
                    self.phase = Phase::Complete;
                } else {
                    self.body_mode = BodyMode::ContentLength(remaining - taken);
                }
                Ok(true)
            }
            BodyMode::UntilEof => {
                if self.buffer.is_empty() {
                    return Ok(false);
                }
                let available = self.buffer.len();
                self.consume_body(available);
                Ok(false)
            }
            BodyMode::Chunked => self.advance_chunked(),
        }
    }

    fn advance_chunked(&mut self) -> Result<bool> {
        match self.chunk_phase {
            ChunkPhase::Size => {
                let Some(line) = self.take_line() else {
                    return Ok(false);
                };
                let size_token = line.split(';').next().unwrap_or("").trim();
                let size = usize::from_str_radix(size_token, 16)
                    .map_err(|_| Error::response_parse("invalid chunk size"))?;
                self.chunk_phase = if size == 0 {
                    ChunkPhase::Trailers
                } else {
                    ChunkPhase::Data(size)
                };
                Ok(true)
            }
            ChunkPhase::Data(remaining) => {
                if self.buffer.is_empty() {
                    return Ok(false);
                }
                let taken = self.consume_body(remaining);
                if remaining == taken {
                    self.chunk_phase = ChunkPhase::DataEnd;
                } else {
                    self.chunk_phase = ChunkPhase::Data(remaining - taken);
                }
                Ok(true)
            }
            ChunkPhase::DataEnd => {
                let Some(line) = self.take_line() else {
                    return Ok(false);
                };
                if !line.is_empty() {
                    return Err(Error::response_parse("missing chunk terminator"));
                }
                self.chunk_phase = ChunkPhase::Size;
                Ok(true)
            }
            ChunkPhase::Trailers => {
                let Some(line) = self.take_line() else {
                    return Ok(false);
                };
                if line.is_empty() {
                    self.phase = Phase::Complete;
                } else {
                    let (name, value) = parse_header_line(&line)?;
                    self.response.headers.append(name, value);
                }
                Ok(true)
            }
        }
    }

    /// Move up to `limit` buffered bytes into the body, honoring ignore_body
    fn consume_body(&mut self, limit: usize) -> usize {
        let take = self.buffer.len().min(limit);
        if self.ignore_body {
            self.buffer.drain(..take);
        } else {
            self.response.body.extend(self.buffer.drain(..take));
        }
        take
    }

    /// Pop one line off the buffer, tolerating bare LF line endings
    fn take_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

fn parse_header_line(line: &str) -> Result<(String, String)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::response_parse("malformed header line"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

/// Receive and parse one response from a transport
///
/// Drives [`ResponseParser`] from transport events, applying `net/timeout`
/// to each pending receive. On failure the partial response accumulated so
/// far travels inside the returned [`Failure`] — it is never lost, merely
/// incomplete.
pub async fn recv_response<T>(
    transport: &mut T,
    config: &Config,
) -> std::result::Result<Response, Failure>
where
    T: Transport + ?Sized,
{
    let mut parser = ResponseParser::new(config.ignore_body);
    loop {
        let event = match with_timeout(config.timeout, transport.recv()).await {
            Ok(event) => event,
            Err(err) => return Err(Failure::new(err, parser.take_partial())),
        };
        match event {
            TransportEvent::Data(data) => {
                tracing::trace!(bytes = data.len(), "received data");
                if let Err(err) = parser.feed(&data) {
                    return Err(Failure::new(err, parser.take_partial()));
                }
                if parser.is_complete() {
                    return Ok(parser.finish());
                }
            }
            TransportEvent::Error(Error::Eof) => {
                tracing::trace!("transport reached end of stream");
                return match parser.finish_on_eof() {
                    Ok(response) => Ok(response),
                    Err(err) => Err(Failure::new(err, parser.take_partial())),
                };
            }
            TransportEvent::Error(err) => {
                return Err(Failure::new(err, parser.take_partial()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::transport::DumbTransport;

    fn plain_config() -> Config {
        Config::from_settings(&Settings::new()).unwrap()
    }

    #[tokio::test]
    async fn test_eof_terminates_close_delimited_body() {
        let mut transport = DumbTransport::new();
        let mut data = String::new();
        data += "HTTP/1.1 200 Ok\r\n";
        data += "Content-Type: text/plain\r\n";
        data += "Connection: close\r\n";
        data += "Server: Antani/1.0.0.0\r\n";
        data += "\r\n";
        data += "1234567";
        transport.emit_data(data.into_bytes());
        transport.emit_error(Error::Eof);

        let response = recv_response(&mut transport, &plain_config())
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, b"1234567");
        assert_eq!(response.headers.get("server"), Some("Antani/1.0.0.0"));
    }

    #[tokio::test]
    async fn test_immediate_eof_fails_with_partial_response() {
        let mut transport = DumbTransport::new();
        transport.emit_error(Error::Eof);

        let failure = recv_response(&mut transport, &plain_config())
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::Eof);
        assert_eq!(failure.response.status_code, 0);
        assert_eq!(failure.response.response_line, "");
    }

    #[tokio::test]
    async fn test_transport_error_propagates_with_partial() {
        let mut transport = DumbTransport::new();
        transport.emit_data(b"HTTP/1.1 200 Ok\r\n".to_vec());
        transport.emit_error(Error::network("connection_reset"));

        let failure = recv_response(&mut transport, &plain_config())
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::network("connection_reset"));
        assert_eq!(failure.response.status_code, 200);
    }

    #[test]
    fn test_content_length_across_arbitrary_feeds() {
        let wire = b"HTTP/1.1 200 Ok\r\nContent-Length: 10\r\n\r\n0123456789extra";
        // Feed one byte at a time to exercise every buffering boundary.
        let mut parser = ResponseParser::new(false);
        for byte in wire.iter() {
            if parser.is_complete() {
                break;
            }
            parser.feed(&[*byte]).unwrap();
        }
        assert!(parser.is_complete());
        let response = parser.finish();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.response_line, "HTTP/1.1 200 Ok");
        assert_eq!(response.http_version, "HTTP/1.1");
        assert_eq!(response.body, b"0123456789");
    }

    #[test]
    fn test_zero_content_length_completes_at_headers() {
        let mut parser = ResponseParser::new(false);
        parser
            .feed(b"HTTP/1.1 200 Ok\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        assert!(parser.is_complete());
        assert!(parser.finish().body.is_empty());
    }

    #[test]
    fn test_chunked_body_reassembly() {
        let wire = b"HTTP/1.1 200 Ok\r\nTransfer-Encoding: chunked\r\n\r\n\
                     4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let mut parser = ResponseParser::new(false);
        parser.feed(wire).unwrap();
        assert!(parser.is_complete());
        assert_eq!(parser.finish().body, b"Wikipedia");

        // Same wire, split at every byte.
        let mut parser = ResponseParser::new(false);
        for byte in wire.iter() {
            parser.feed(&[*byte]).unwrap();
        }
        assert!(parser.is_complete());
        assert_eq!(parser.finish().body, b"Wikipedia");
    }

    #[test]
    fn test_chunked_trailers_are_appended() {
        let wire = b"HTTP/1.1 200 Ok\r\nTransfer-Encoding: chunked\r\n\r\n\
                     3\r\nabc\r\n0\r\nExpires: never\r\n\r\n";
        let mut parser = ResponseParser::new(false);
        parser.feed(wire).unwrap();
        assert!(parser.is_complete());
        let response = parser.finish();
        assert_eq!(response.body, b"abc");
        assert_eq!(response.headers.get("expires"), Some("never"));
    }

    #[test]
    fn test_ignore_body_skips_accumulation() {
        let mut parser = ResponseParser::new(true);
        parser
            .feed(b"HTTP/1.1 200 Ok\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap();
        assert!(parser.is_complete());
        assert!(parser.finish().body.is_empty());
    }

    #[test]
    fn test_eof_mid_sized_body_is_truncation() {
        let mut parser = ResponseParser::new(false);
        parser
            .feed(b"HTTP/1.1 200 Ok\r\nContent-Length: 10\r\n\r\n0123")
            .unwrap();
        assert_eq!(parser.finish_on_eof().unwrap_err(), Error::Eof);
    }

    #[test]
    fn test_eof_mid_headers_is_truncation() {
        let mut parser = ResponseParser::new(false);
        parser.feed(b"HTTP/1.1 200 Ok\r\nContent-").unwrap();
        assert_eq!(parser.finish_on_eof().unwrap_err(), Error::Eof);
    }

    #[test]
    fn test_malformed_status_line() {
        let mut parser = ResponseParser::new(false);
        let err = parser.feed(b"antani\r\n").unwrap_err();
        assert!(matches!(err, Error::ResponseParse(_)));

        let mut parser = ResponseParser::new(false);
        let err = parser.feed(b"HTTP/1.1 antani Ok\r\n").unwrap_err();
        assert!(matches!(err, Error::ResponseParse(_)));
    }

    #[test]
    fn test_bodyless_statuses_complete_at_headers() {
        for status in ["204 No Content", "304 Not Modified", "100 Continue"] {
            let mut parser = ResponseParser::new(false);
            parser
                .feed(format!("HTTP/1.1 {status}\r\n\r\n").as_bytes())
                .unwrap();
            assert!(parser.is_complete(), "status {status} should be bodyless");
        }
    }

    #[test]
    fn test_previous_chain_traversal() {
        let mut oldest = Response::default();
        oldest.status_code = 301;
        let mut middle = Response::default();
        middle.status_code = 302;
        let mut last = Response::default();
        last.status_code = 200;
        last.set_history(vec![oldest, middle]);

        let previous = last.previous().unwrap();
        assert_eq!(previous.status_code, 302);
        let earlier = previous.previous().unwrap();
        assert_eq!(earlier.status_code, 301);
        assert!(earlier.previous().is_none());
    }

    #[test]
    fn test_json_helper() {
        let mut response = Response::default();
        response.body = br#"{"antani": true}"#.to_vec();
        assert_eq!(response.json().unwrap()["antani"], true);
        response.body = b"{".to_vec();
        assert_eq!(response.json().unwrap_err(), Error::JsonProcessing);
    }
}
