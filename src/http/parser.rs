//! Incremental HTTP/1.x message parser.
//!
//! # Data Flow
//! ```text
//! socket bytes
//!     → feed(byte) / feed_slice(bytes)
//!     → StartLine → Headers → (none | Content-Length | chunked [+ trailers] | EOF) → Done
//!     → take_request() / take_response()
//! ```
//!
//! # Design Decisions
//! - One byte at a time; nothing needs to be buffered ahead of the parser
//! - All cursor state lives in an owned `ParseState`, one per connection
//! - `Transfer-Encoding: chunked` wins over `Content-Length`
//! - After `Complete`, unconsumed input belongs to the next message

use crate::http::header::{Header, Headers};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::StatusCode;
use crate::http::version::Version;

const VERSION_PREFIX: &[u8] = b"HTTP/1.";

/// Upper bound on what one chunk header may pre-allocate.
const MAX_CHUNK_RESERVE: u64 = 64 * 1024;

/// Reasons a message could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid method token")]
    InvalidMethod,
    #[error("invalid request target")]
    InvalidTarget,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("invalid status line")]
    InvalidStatusLine,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("invalid Content-Length value")]
    InvalidContentLength,
    #[error("conflicting Content-Length values")]
    ConflictingContentLength,
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error("malformed chunk framing")]
    InvalidChunkFraming,
    #[error("start line exceeds {0} bytes")]
    StartLineTooLong(usize),
    #[error("header section exceeds {0} bytes")]
    HeadersTooLarge(usize),
    #[error("more than {0} header fields")]
    TooManyHeaders(usize),
    #[error("body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("connection closed before the message was complete")]
    UnexpectedEof,
}

/// Outcome of feeding input to a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    /// A full message is available.
    Complete,
    /// More input is needed.
    Incomplete,
    /// The stream is not valid HTTP; no further progress is possible.
    Failed(ParseError),
}

impl ParseStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, ParseStatus::Complete)
    }
}

/// Size ceilings applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    pub max_start_line: usize,
    pub max_header_bytes: usize,
    pub max_headers: usize,
    pub max_body_size: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_start_line: 8 * 1024,
            max_header_bytes: 64 * 1024,
            max_headers: 100,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    // request line
    Method,
    Target,
    RequestVersion(usize),
    RequestMinor,
    SimpleRequestLf,
    // status line
    ResponseVersion(usize),
    ResponseMinor,
    StatusSpace,
    StatusCode,
    Reason,
    // shared
    StartLineCr,
    StartLineLf,
    HeaderStart,
    HeaderName,
    HeaderSpace,
    HeaderValue,
    HeaderLf,
    FoldSpace,
    HeadersEndLf,
    ContentBody,
    ChunkSize,
    ChunkExtension,
    ChunkSizeLf,
    ChunkData,
    ChunkDataCr,
    ChunkDataLf,
    EofBody,
    Done,
    Failed,
}

/// Cursor of one in-progress message.
///
/// Owned by a single connection and reset between messages.
#[derive(Debug)]
pub struct ParseState {
    kind: Kind,
    stage: Stage,
    limits: ParserLimits,
    error: Option<ParseError>,

    method: String,
    target: Vec<u8>,
    status: u16,
    status_digits: u8,
    reason: Vec<u8>,
    version: Version,

    headers: Headers,
    trailers: Headers,
    in_trailers: bool,
    name: String,
    value: Vec<u8>,

    body: Vec<u8>,
    chunked: bool,
    remaining: u64,
    chunk_digits: usize,

    consumed: usize,
    start_line_len: usize,
    header_bytes: usize,
    head_response: bool,
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn is_ctl(b: u8) -> bool {
    b < 0x20 || b == 0x7f
}

fn hex_value(b: u8) -> Option<u64> {
    (b as char).to_digit(16).map(u64::from)
}

impl ParseState {
    fn new(kind: Kind, limits: ParserLimits) -> Self {
        Self {
            kind,
            stage: Self::initial_stage(kind),
            limits,
            error: None,
            method: String::new(),
            target: Vec::new(),
            status: 0,
            status_digits: 0,
            reason: Vec::new(),
            version: Version::HTTP_10,
            headers: Headers::new(),
            trailers: Headers::new(),
            in_trailers: false,
            name: String::new(),
            value: Vec::new(),
            body: Vec::new(),
            chunked: false,
            remaining: 0,
            chunk_digits: 0,
            consumed: 0,
            start_line_len: 0,
            header_bytes: 0,
            head_response: false,
        }
    }

    fn initial_stage(kind: Kind) -> Stage {
        match kind {
            Kind::Request => Stage::Method,
            Kind::Response => Stage::ResponseVersion(0),
        }
    }

    /// Return to the start-line state, keeping limits.
    pub fn reset(&mut self) {
        let limits = self.limits;
        *self = Self::new(self.kind, limits);
    }

    /// True once any byte of the current message has been consumed.
    pub fn has_started(&self) -> bool {
        self.consumed > 0
    }

    /// True when the current message uses chunked framing.
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    fn fail(&mut self, error: ParseError) -> ParseStatus {
        self.stage = Stage::Failed;
        self.error = Some(error.clone());
        ParseStatus::Failed(error)
    }

    fn status(&self) -> ParseStatus {
        match self.stage {
            Stage::Done => ParseStatus::Complete,
            Stage::Failed => ParseStatus::Failed(
                self.error.clone().unwrap_or(ParseError::InvalidHeader),
            ),
            _ => ParseStatus::Incomplete,
        }
    }

    fn in_start_line(&self) -> bool {
        matches!(
            self.stage,
            Stage::Method
                | Stage::Target
                | Stage::RequestVersion(_)
                | Stage::RequestMinor
                | Stage::SimpleRequestLf
                | Stage::ResponseVersion(_)
                | Stage::ResponseMinor
                | Stage::StatusSpace
                | Stage::StatusCode
                | Stage::Reason
                | Stage::StartLineCr
                | Stage::StartLineLf
        )
    }

    fn in_header_block(&self) -> bool {
        matches!(
            self.stage,
            Stage::HeaderStart
                | Stage::HeaderName
                | Stage::HeaderSpace
                | Stage::HeaderValue
                | Stage::HeaderLf
                | Stage::FoldSpace
                | Stage::HeadersEndLf
        )
    }

    /// Advance the state machine by a single byte.
    ///
    /// Bytes fed after `Complete` or `Failed` are not consumed.
    pub fn feed(&mut self, b: u8) -> ParseStatus {
        if matches!(self.stage, Stage::Done | Stage::Failed) {
            return self.status();
        }
        self.consumed += 1;

        if self.in_start_line() {
            self.start_line_len += 1;
            if self.start_line_len > self.limits.max_start_line {
                return self.fail(ParseError::StartLineTooLong(self.limits.max_start_line));
            }
        } else if self.in_header_block() {
            self.header_bytes += 1;
            if self.header_bytes > self.limits.max_header_bytes {
                return self.fail(ParseError::HeadersTooLarge(self.limits.max_header_bytes));
            }
        }

        match self.stage {
            Stage::Method => {
                if b == b' ' && !self.method.is_empty() {
                    self.stage = Stage::Target;
                } else if is_tchar(b) {
                    self.method.push(b as char);
                } else {
                    return self.fail(ParseError::InvalidMethod);
                }
            }
            Stage::Target => match b {
                b' ' if !self.target.is_empty() => self.stage = Stage::RequestVersion(0),
                b'\r' if !self.target.is_empty() => self.stage = Stage::SimpleRequestLf,
                _ if is_ctl(b) || b == b' ' => return self.fail(ParseError::InvalidTarget),
                _ => self.target.push(b),
            },
            Stage::RequestVersion(i) => {
                if b != VERSION_PREFIX[i] {
                    return self.fail(ParseError::InvalidVersion);
                }
                self.stage = if i + 1 == VERSION_PREFIX.len() {
                    Stage::RequestMinor
                } else {
                    Stage::RequestVersion(i + 1)
                };
            }
            Stage::RequestMinor | Stage::ResponseMinor => {
                let minor = match b {
                    b'0' => 0,
                    b'1' => 1,
                    _ => return self.fail(ParseError::InvalidVersion),
                };
                self.version = Version::new(1, minor);
                self.stage = if self.stage == Stage::RequestMinor {
                    Stage::StartLineCr
                } else {
                    Stage::StatusSpace
                };
            }
            Stage::SimpleRequestLf => {
                if b != b'\n' {
                    return self.fail(ParseError::InvalidTarget);
                }
                self.version = Version::HTTP_09;
                self.stage = Stage::Done;
            }
            Stage::ResponseVersion(i) => {
                if b != VERSION_PREFIX[i] {
                    return self.fail(ParseError::InvalidStatusLine);
                }
                self.stage = if i + 1 == VERSION_PREFIX.len() {
                    Stage::ResponseMinor
                } else {
                    Stage::ResponseVersion(i + 1)
                };
            }
            Stage::StatusSpace => {
                if b != b' ' {
                    return self.fail(ParseError::InvalidStatusLine);
                }
                self.stage = Stage::StatusCode;
            }
            Stage::StatusCode => match b {
                b'0'..=b'9' if self.status_digits < 3 => {
                    self.status = self.status * 10 + u16::from(b - b'0');
                    self.status_digits += 1;
                }
                b' ' if self.status_digits == 3 => self.stage = Stage::Reason,
                b'\r' if self.status_digits == 3 => self.stage = Stage::StartLineLf,
                _ => return self.fail(ParseError::InvalidStatusLine),
            },
            Stage::Reason => match b {
                b'\r' => self.stage = Stage::StartLineLf,
                b'\t' => self.reason.push(b),
                _ if is_ctl(b) => return self.fail(ParseError::InvalidStatusLine),
                _ => self.reason.push(b),
            },
            Stage::StartLineCr => {
                if b != b'\r' {
                    return self.fail(ParseError::InvalidVersion);
                }
                self.stage = Stage::StartLineLf;
            }
            Stage::StartLineLf => {
                if b != b'\n' {
                    return self.fail(ParseError::InvalidVersion);
                }
                if self.kind == Kind::Response && StatusCode::from_u16(self.status).is_none() {
                    return self.fail(ParseError::InvalidStatusLine);
                }
                self.stage = Stage::HeaderStart;
            }
            Stage::HeaderStart => {
                let has_previous = if self.in_trailers {
                    !self.trailers.is_empty()
                } else {
                    !self.headers.is_empty()
                };
                match b {
                    b'\r' => self.stage = Stage::HeadersEndLf,
                    b' ' | b'\t' if has_previous => {
                        // obs-fold: reopen the previous field and keep appending
                        let collection = if self.in_trailers {
                            &mut self.trailers
                        } else {
                            &mut self.headers
                        };
                        if let Some(Header { name, value }) = collection.pop() {
                            self.name = name;
                            self.value = value.into_bytes();
                        }
                        self.stage = Stage::FoldSpace;
                    }
                    _ if is_tchar(b) => {
                        self.name.push(b as char);
                        self.stage = Stage::HeaderName;
                    }
                    _ => return self.fail(ParseError::InvalidHeader),
                }
            }
            Stage::HeaderName => match b {
                b':' => self.stage = Stage::HeaderSpace,
                _ if is_tchar(b) => self.name.push(b as char),
                _ => return self.fail(ParseError::InvalidHeader),
            },
            Stage::HeaderSpace | Stage::FoldSpace => match b {
                b' ' | b'\t' => {}
                b'\r' => self.stage = Stage::HeaderLf,
                _ if is_ctl(b) => return self.fail(ParseError::InvalidHeader),
                _ => {
                    self.value.push(b);
                    self.stage = Stage::HeaderValue;
                }
            },
            Stage::HeaderValue => match b {
                b'\r' => self.stage = Stage::HeaderLf,
                b'\t' => self.value.push(b),
                _ if is_ctl(b) => return self.fail(ParseError::InvalidHeader),
                _ => self.value.push(b),
            },
            Stage::HeaderLf => {
                if b != b'\n' {
                    return self.fail(ParseError::InvalidHeader);
                }
                if let Err(e) = self.commit_header() {
                    return self.fail(e);
                }
                self.stage = Stage::HeaderStart;
            }
            Stage::HeadersEndLf => {
                if b != b'\n' {
                    return self.fail(ParseError::InvalidHeader);
                }
                if self.in_trailers {
                    self.stage = Stage::Done;
                } else if let Err(e) = self.select_body() {
                    return self.fail(e);
                }
            }
            Stage::ContentBody => {
                self.body.push(b);
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.stage = Stage::Done;
                }
            }
            Stage::ChunkSize => match hex_value(b) {
                Some(digit) => {
                    self.chunk_digits += 1;
                    self.remaining = match self
                        .remaining
                        .checked_mul(16)
                        .and_then(|v| v.checked_add(digit))
                    {
                        Some(v) => v,
                        None => return self.fail(ParseError::InvalidChunkSize),
                    };
                }
                None if self.chunk_digits == 0 => return self.fail(ParseError::InvalidChunkSize),
                None => match b {
                    b';' => self.stage = Stage::ChunkExtension,
                    b'\r' => self.stage = Stage::ChunkSizeLf,
                    _ => return self.fail(ParseError::InvalidChunkSize),
                },
            },
            Stage::ChunkExtension => match b {
                b'\r' => self.stage = Stage::ChunkSizeLf,
                b'\t' => {}
                _ if is_ctl(b) => return self.fail(ParseError::InvalidChunkSize),
                _ => {}
            },
            Stage::ChunkSizeLf => {
                if b != b'\n' {
                    return self.fail(ParseError::InvalidChunkFraming);
                }
                self.chunk_digits = 0;
                if self.remaining == 0 {
                    self.in_trailers = true;
                    self.header_bytes = 0;
                    self.stage = Stage::HeaderStart;
                } else if (self.body.len() as u64)
                    .checked_add(self.remaining)
                    .map_or(true, |total| total > self.limits.max_body_size as u64)
                {
                    return self.fail(ParseError::BodyTooLarge(self.limits.max_body_size));
                } else {
                    self.body.reserve(self.remaining.min(MAX_CHUNK_RESERVE) as usize);
                    self.stage = Stage::ChunkData;
                }
            }
            Stage::ChunkData => {
                self.body.push(b);
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.stage = Stage::ChunkDataCr;
                }
            }
            Stage::ChunkDataCr => {
                if b != b'\r' {
                    return self.fail(ParseError::InvalidChunkFraming);
                }
                self.stage = Stage::ChunkDataLf;
            }
            Stage::ChunkDataLf => {
                if b != b'\n' {
                    return self.fail(ParseError::InvalidChunkFraming);
                }
                self.stage = Stage::ChunkSize;
            }
            Stage::EofBody => {
                if self.body.len() >= self.limits.max_body_size {
                    return self.fail(ParseError::BodyTooLarge(self.limits.max_body_size));
                }
                self.body.push(b);
            }
            Stage::Done | Stage::Failed => {}
        }

        self.status()
    }

    /// Feed as many bytes as belong to the current message.
    ///
    /// Returns how many bytes of `input` were consumed together with the
    /// resulting status. Body bytes are copied in bulk.
    pub fn feed_slice(&mut self, input: &[u8]) -> (usize, ParseStatus) {
        let mut pos = 0;
        while pos < input.len() {
            let bulk = match self.stage {
                Stage::ContentBody | Stage::ChunkData => {
                    (self.remaining.min((input.len() - pos) as u64)) as usize
                }
                Stage::EofBody => {
                    let room = self.limits.max_body_size.saturating_sub(self.body.len());
                    (input.len() - pos).min(room)
                }
                _ => 0,
            };

            if bulk > 1 {
                self.body.extend_from_slice(&input[pos..pos + bulk]);
                self.consumed += bulk;
                pos += bulk;
                if self.stage != Stage::EofBody {
                    self.remaining -= bulk as u64;
                    if self.remaining == 0 {
                        self.stage = if self.stage == Stage::ContentBody {
                            Stage::Done
                        } else {
                            Stage::ChunkDataCr
                        };
                    }
                }
            } else {
                let status = self.feed(input[pos]);
                pos += 1;
                if status != ParseStatus::Incomplete {
                    return (pos, status);
                }
                continue;
            }

            let status = self.status();
            if status != ParseStatus::Incomplete {
                return (pos, status);
            }
        }
        (pos, self.status())
    }

    fn commit_header(&mut self) -> Result<(), ParseError> {
        let collection = if self.in_trailers {
            &mut self.trailers
        } else {
            &mut self.headers
        };
        if collection.len() >= self.limits.max_headers {
            return Err(ParseError::TooManyHeaders(self.limits.max_headers));
        }
        let name = std::mem::take(&mut self.name);
        let value = String::from_utf8_lossy(&std::mem::take(&mut self.value)).into_owned();
        collection.append(name, value);
        Ok(())
    }

    /// Decide the framing of the body once the header block has ended.
    fn select_body(&mut self) -> Result<(), ParseError> {
        let transfer_coding = self
            .headers
            .get_all("Transfer-Encoding")
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .last()
            .map(str::to_ascii_lowercase);

        let bodyless_reply = self.kind == Kind::Response
            && (self.head_response
                || StatusCode::from_u16(self.status).map_or(false, |s| !s.allows_body()));
        if bodyless_reply {
            self.stage = Stage::Done;
            return Ok(());
        }

        if transfer_coding.as_deref() == Some("chunked") {
            self.chunked = true;
            self.remaining = 0;
            self.stage = Stage::ChunkSize;
            return Ok(());
        }

        if let Some(length) = self.content_length()? {
            if length > self.limits.max_body_size as u64 {
                return Err(ParseError::BodyTooLarge(self.limits.max_body_size));
            }
            self.remaining = length;
            if length == 0 {
                self.stage = Stage::Done;
            } else {
                self.body.reserve(length as usize);
                self.stage = Stage::ContentBody;
            }
            return Ok(());
        }

        self.stage = match self.kind {
            Kind::Request => Stage::Done,
            Kind::Response => Stage::EofBody,
        };
        Ok(())
    }

    /// Every `Content-Length` value must be plain digits and agree.
    fn content_length(&self) -> Result<Option<u64>, ParseError> {
        let mut length: Option<u64> = None;
        for raw in self.headers.get_all("Content-Length").flat_map(|v| v.split(',')) {
            let raw = raw.trim();
            if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseError::InvalidContentLength);
            }
            let value: u64 = raw.parse().map_err(|_| ParseError::InvalidContentLength)?;
            match length {
                Some(previous) if previous != value => {
                    return Err(ParseError::ConflictingContentLength)
                }
                _ => length = Some(value),
            }
        }
        Ok(length)
    }

    /// Signal end of input. Completes EOF-delimited bodies.
    pub fn finish(&mut self) -> ParseStatus {
        match self.stage {
            Stage::EofBody => {
                self.stage = Stage::Done;
                ParseStatus::Complete
            }
            Stage::Done | Stage::Failed => self.status(),
            _ => self.fail(ParseError::UnexpectedEof),
        }
    }
}

/// Parser for the request side of a connection.
#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
}

impl RequestParser {
    pub fn new() -> Self {
        Self::with_limits(ParserLimits::default())
    }

    pub fn with_limits(limits: ParserLimits) -> Self {
        Self {
            state: ParseState::new(Kind::Request, limits),
        }
    }

    pub fn feed(&mut self, b: u8) -> ParseStatus {
        self.state.feed(b)
    }

    pub fn feed_slice(&mut self, input: &[u8]) -> (usize, ParseStatus) {
        self.state.feed_slice(input)
    }

    pub fn has_started(&self) -> bool {
        self.state.has_started()
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Hand out the completed request and reset for the next one.
    pub fn take_request(&mut self) -> Option<Request> {
        if self.state.stage != Stage::Done {
            return None;
        }
        let st = &mut self.state;
        let request = Request::from_parts(
            std::mem::take(&mut st.method),
            String::from_utf8_lossy(&st.target).into_owned(),
            st.version,
            std::mem::take(&mut st.headers),
            std::mem::take(&mut st.body),
        )
        .with_trailers(std::mem::take(&mut st.trailers));
        st.reset();
        Some(request)
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parser for replies, used by clients and in round-trip checks.
#[derive(Debug)]
pub struct ResponseParser {
    state: ParseState,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::with_limits(ParserLimits::default())
    }

    pub fn with_limits(limits: ParserLimits) -> Self {
        Self {
            state: ParseState::new(Kind::Response, limits),
        }
    }

    /// The next reply answers a HEAD request and carries no body.
    pub fn expect_head_response(&mut self, head: bool) {
        self.state.head_response = head;
    }

    pub fn feed(&mut self, b: u8) -> ParseStatus {
        self.state.feed(b)
    }

    pub fn feed_slice(&mut self, input: &[u8]) -> (usize, ParseStatus) {
        self.state.feed_slice(input)
    }

    pub fn finish(&mut self) -> ParseStatus {
        self.state.finish()
    }

    pub fn has_started(&self) -> bool {
        self.state.has_started()
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn take_response(&mut self) -> Option<Response> {
        if self.state.stage != Stage::Done {
            return None;
        }
        let st = &mut self.state;
        let status = StatusCode::from_u16(st.status)?;
        let reason = String::from_utf8_lossy(&st.reason).into_owned();
        let response = Response::from_parts(
            status,
            st.version,
            std::mem::take(&mut st.headers),
            std::mem::take(&mut st.body),
        )
        .with_reason(reason)
        .with_trailers(std::mem::take(&mut st.trailers));
        st.reset();
        Some(response)
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}
