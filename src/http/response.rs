//! Outgoing HTTP response.
//!
//! # Body Kinds
//! - `Body::Fixed`: bytes known up front, framed with `Content-Length`
//! - `Body::Stream`: pulled from a [`BodySource`] while writing, framed with
//!   chunked transfer-coding on 1.1 and by closing the connection on 1.0

use std::fmt;
use std::io::{self, Read};
use std::time::SystemTime;

use serde::Serialize;

use crate::http::chunked::{self, CHUNK_SIZE};
use crate::http::header::Headers;
use crate::http::status::StatusCode;
use crate::http::version::Version;

/// Default value of the `Server` header.
pub const DEFAULT_SERVER_NAME: &str = concat!("http-engine/", env!("CARGO_PKG_VERSION"));

/// A pull-based body producer. `Ok(None)` signals end of data.
pub trait BodySource: Send {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Adapts any reader into a [`BodySource`] yielding 10 KiB pieces.
pub struct ReaderSource<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl<R: Read + Send> BodySource for ReaderSource<R> {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(buf));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Yields pre-built chunks from an iterator.
pub struct IterSource<I> {
    chunks: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Vec<u8>> + Send,
{
    pub fn new(chunks: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            chunks: chunks.into_iter(),
        }
    }
}

impl<I> BodySource for IterSource<I>
where
    I: Iterator<Item = Vec<u8>> + Send,
{
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.chunks.next())
    }
}

/// Response payload.
pub enum Body {
    Fixed(Vec<u8>),
    Stream(Box<dyn BodySource>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Fixed(bytes) => f.debug_tuple("Fixed").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Fixed(Vec::new())
    }
}

/// An HTTP reply.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    version: Version,
    headers: Headers,
    trailers: Headers,
    body: Body,
}

impl Response {
    /// Empty reply carrying `Date`, `Server` and `Content-Length: 0`.
    pub fn new(status: StatusCode) -> Self {
        let mut headers = Headers::new();
        headers.append("Date", httpdate::fmt_http_date(SystemTime::now()));
        headers.append("Server", DEFAULT_SERVER_NAME);
        headers.append("Content-Length", "0");
        Self {
            status,
            reason: None,
            version: Version::HTTP_11,
            headers,
            trailers: Headers::new(),
            body: Body::default(),
        }
    }

    /// Reply assembled from parsed pieces, without default headers.
    pub fn from_parts(status: StatusCode, version: Version, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            status,
            reason: None,
            version,
            headers,
            trailers: Headers::new(),
            body: Body::Fixed(body),
        }
    }

    pub(crate) fn with_reason(mut self, reason: String) -> Self {
        self.reason = Some(reason).filter(|r| !r.is_empty());
        self
    }

    pub(crate) fn with_trailers(mut self, trailers: Headers) -> Self {
        self.trailers = trailers;
        self
    }

    /// Small HTML page describing `status`.
    pub fn stock(status: StatusCode) -> Self {
        let mut response = Response::new(status);
        let page = format!(
            "<html><head><title>{code} {reason}</title></head><body><h1>{reason}</h1><p>{description}</p></body></html>",
            code = status.as_u16(),
            reason = status.reason(),
            description = status.description(),
        );
        response.set_content(page.into_bytes(), "text/html; charset=utf-8");
        response
    }

    pub fn redirect(location: &str, status: StatusCode) -> Self {
        let mut response = Response::stock(status);
        response.headers.set("Location", location);
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.reason = None;
    }

    /// Reason phrase as received, or the registry text.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_else(|| self.status.reason())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Fixed body bytes; `None` for streaming bodies.
    pub fn content(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Fixed(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    /// Bytes of fixed content, used for access logging.
    pub fn size(&self) -> usize {
        self.content().map_or(0, <[u8]>::len)
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>, content_type: &str) {
        let content = content.into();
        self.headers.remove("Transfer-Encoding");
        self.headers.set("Content-Length", content.len().to_string());
        self.headers.set("Content-Type", content_type);
        self.body = Body::Fixed(content);
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.set_content(text.into().into_bytes(), "text/plain; charset=utf-8");
    }

    pub fn set_html(&mut self, html: impl Into<String>) {
        self.set_content(html.into().into_bytes(), "text/html; charset=utf-8");
    }

    pub fn set_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        self.set_content(bytes, "application/json");
        Ok(())
    }

    /// Attach a body of unknown length.
    pub fn set_stream(&mut self, source: Box<dyn BodySource>, content_type: &str) {
        self.headers.remove("Content-Length");
        self.headers.set("Transfer-Encoding", "chunked");
        self.headers.set("Content-Type", content_type);
        self.body = Body::Stream(source);
    }

    /// Add a `Set-Cookie` header. Directives with an empty value are
    /// written bare, e.g. `HttpOnly`.
    pub fn set_cookie(&mut self, name: &str, value: &str, directives: &[(&str, &str)]) {
        let mut cookie = format!("{}={}", name, value);
        for (directive, arg) in directives {
            cookie.push_str("; ");
            cookie.push_str(directive);
            if !arg.is_empty() {
                cookie.push('=');
                cookie.push_str(arg);
            }
        }
        self.headers.append("Set-Cookie", cookie);
    }

    /// Tell the client to drop a cookie.
    pub fn delete_cookie(&mut self, name: &str) {
        let expired = httpdate::fmt_http_date(SystemTime::UNIX_EPOCH);
        self.set_cookie(name, "", &[("Expires", &expired), ("Path", "/")]);
    }

    /// Value of a cookie set on this response.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all("Set-Cookie")
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.to_string())
    }

    /// Drop the payload while keeping headers, for HEAD and OPTIONS.
    pub fn strip_body(&mut self) {
        self.body = Body::default();
    }

    /// Whether this response lets the connection stay open.
    pub fn keep_alive(&self) -> bool {
        !self.headers.has_token("Connection", "close")
    }

    /// Fix version and connection headers for the wire.
    ///
    /// Returns whether the connection may be reused afterwards.
    pub fn prepare_for(&mut self, request_version: Version, client_keep_alive: bool) -> bool {
        let version = request_version.min(Version::HTTP_11).max(Version::HTTP_10);
        self.version = version;

        let mut keep_alive =
            client_keep_alive && self.keep_alive() && request_version >= Version::HTTP_10;

        if self.is_streaming() && version == Version::HTTP_10 {
            // length is only discoverable by closing the connection
            self.headers.remove("Transfer-Encoding");
            self.headers.remove("Content-Length");
            keep_alive = false;
        }

        if !keep_alive {
            self.headers.set("Connection", "close");
        } else if version == Version::HTTP_10 {
            self.headers.set("Connection", "keep-alive");
        }
        keep_alive
    }

    /// Status line and header block, terminated by the blank line.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(
            format!("{} {} {}\r\n", self.version, self.status.as_u16(), self.reason()).as_bytes(),
        );
        self.headers.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Full wire form. Streaming bodies are drained chunk-encoded.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut out = self.head_bytes();
        match &mut self.body {
            Body::Fixed(bytes) => out.extend_from_slice(bytes),
            Body::Stream(source) => out.extend_from_slice(&chunked::encode_all(source.as_mut())?),
        }
        Ok(out)
    }
}

impl Default for Response {
    fn default() -> Self {
        Response::new(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parser::{ParseStatus, ResponseParser};

    fn reparse(bytes: &[u8]) -> Response {
        let mut parser = ResponseParser::new();
        let (used, status) = parser.feed_slice(bytes);
        assert_eq!(status, ParseStatus::Complete);
        assert_eq!(used, bytes.len());
        parser.take_response().unwrap()
    }

    #[test]
    fn fixed_body_survives_reparse() {
        let mut response = Response::new(StatusCode::CREATED);
        response.set_header("X-First", "1");
        response.set_cookie("a", "1", &[("HttpOnly", "")]);
        response.set_cookie("b", "2", &[("Path", "/")]);
        response.set_text("created!");
        let headers = response.headers().clone();

        let parsed = reparse(&response.into_bytes().unwrap());
        assert_eq!(parsed.status(), StatusCode::CREATED);
        assert_eq!(parsed.headers(), &headers);
        assert_eq!(parsed.content(), Some(&b"created!"[..]));
    }

    #[test]
    fn streamed_body_survives_reparse() {
        let mut response = Response::new(StatusCode::OK);
        let chunks = vec![vec![b'a'; CHUNK_SIZE], b"tail".to_vec()];
        response.set_stream(Box::new(IterSource::new(chunks)), "application/octet-stream");
        let headers = response.headers().clone();

        let parsed = reparse(&response.into_bytes().unwrap());
        assert_eq!(parsed.headers(), &headers);
        let body = parsed.content().unwrap();
        assert_eq!(body.len(), CHUNK_SIZE + 4);
        assert!(body.ends_with(b"tail"));
    }

    #[test]
    fn reader_source_cuts_pieces() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 5];
        let mut source = ReaderSource::new(std::io::Cursor::new(data));
        let mut sizes = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes.iter().sum::<usize>(), CHUNK_SIZE * 2 + 5);
        assert!(sizes.iter().all(|&n| n <= CHUNK_SIZE));
    }

    #[test]
    fn stock_reply_mentions_reason() {
        let response = Response::stock(StatusCode::NOT_FOUND);
        let body = String::from_utf8(response.content().unwrap().to_vec()).unwrap();
        assert!(body.contains("<h1>Not Found</h1>"));
        assert_eq!(response.header("Content-Length"), Some(body.len().to_string().as_str()));
    }

    #[test]
    fn cookies_round_trip_through_headers() {
        let mut response = Response::new(StatusCode::OK);
        response.set_cookie("csrf-token", "xyz", &[("HttpOnly", ""), ("SameSite", "Lax"), ("Path", "/")]);
        assert_eq!(
            response.header("Set-Cookie"),
            Some("csrf-token=xyz; HttpOnly; SameSite=Lax; Path=/")
        );
        assert_eq!(response.cookie("csrf-token").as_deref(), Some("xyz"));

        response.delete_cookie("access_token");
        let deleted = response.headers().get_all("Set-Cookie").nth(1).unwrap().to_string();
        assert!(deleted.starts_with("access_token=; Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn strip_keeps_headers() {
        let mut response = Response::new(StatusCode::OK);
        response.set_text("body");
        response.strip_body();
        assert_eq!(response.header("Content-Length"), Some("4"));
        assert_eq!(response.content(), Some(&b""[..]));
    }

    #[test]
    fn http10_stream_closes_connection() {
        let mut response = Response::new(StatusCode::OK);
        response.set_stream(Box::new(IterSource::new(vec![b"x".to_vec()])), "text/plain");
        assert!(!response.prepare_for(Version::HTTP_10, true));
        assert_eq!(response.header("Connection"), Some("close"));
        assert!(response.header("Transfer-Encoding").is_none());

        let mut response = Response::new(StatusCode::OK);
        assert!(response.prepare_for(Version::HTTP_10, true));
        assert_eq!(response.header("Connection"), Some("keep-alive"));
        assert_eq!(response.version(), Version::HTTP_10);
    }

    #[test]
    fn server_close_wins() {
        let mut response = Response::new(StatusCode::OK);
        response.set_header("Connection", "close");
        assert!(!response.prepare_for(Version::HTTP_11, true));
    }
}
