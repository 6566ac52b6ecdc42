//! Connection actor and lifecycle tracking.
//!
//! # Responsibilities
//! - Own one socket and one parser across many messages
//! - Hand complete requests to the dispatcher, write the replies
//! - Decide keep-alive vs. close, keep pipelined bytes for the next cycle
//! - Generate unique connection IDs for tracing
//! - Track live connections for graceful shutdown
//!
//! # Design Decisions
//! - Parser state and buffers are owned by the actor, never shared
//! - A parse failure gets one 400 and the connection closes
//! - Write errors abort the connection, nothing is retried
//! - Idle keep-alive connections close on shutdown; busy ones finish first

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::chunked;
use crate::http::{Body, ParseError, ParseStatus, ParserLimits, Request, RequestParser, Response, StatusCode, Version};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::routing::Dispatcher;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened();
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed.
    pub async fn wait_for_shutdown(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Why a connection ended abnormally.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    Parse(ParseError),
}

/// One socket, one parser, many request/response exchanges.
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    local: Option<SocketAddr>,
    dispatcher: Arc<Dispatcher>,
    parser: RequestParser,
    shutdown: Arc<Shutdown>,
    pending: Vec<u8>,
}

impl Connection<TcpStream> {
    pub fn from_tcp(
        stream: TcpStream,
        peer: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        limits: ParserLimits,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        let local = stream.local_addr().ok();
        let mut connection = Connection::new(stream, peer, dispatcher, limits, shutdown);
        connection.local = local;
        connection
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        limits: ParserLimits,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            stream,
            peer,
            local: None,
            dispatcher,
            parser: RequestParser::with_limits(limits),
            shutdown,
            pending: Vec::new(),
        }
    }

    /// Drive the connection until the peer leaves, keep-alive ends or an
    /// error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let status = if self.pending.is_empty() {
                ParseStatus::Incomplete
            } else {
                let (consumed, status) = self.parser.feed_slice(&self.pending);
                self.pending.drain(..consumed);
                status
            };

            match status {
                ParseStatus::Complete => {
                    let Some(request) = self.parser.take_request() else {
                        continue;
                    };
                    if !self.exchange(request).await? {
                        break;
                    }
                }
                ParseStatus::Failed(error) => {
                    metrics::record_parse_failure();
                    tracing::warn!(peer = %self.peer, error = %error, "Rejecting malformed request");
                    self.reject().await?;
                    return Err(ConnectionError::Parse(error));
                }
                ParseStatus::Incomplete => {
                    let idle = !self.parser.has_started();
                    let read = if idle {
                        tokio::select! {
                            _ = self.shutdown.wait() => {
                                tracing::debug!(peer = %self.peer, "Closing idle connection for shutdown");
                                break;
                            }
                            read = self.stream.read(&mut buffer) => read?,
                        }
                    } else {
                        self.stream.read(&mut buffer).await?
                    };
                    if read == 0 {
                        if !idle {
                            tracing::debug!(peer = %self.peer, "Peer closed mid-request");
                        }
                        break;
                    }
                    self.pending.extend_from_slice(&buffer[..read]);
                }
            }
        }
        let _ = self.stream.shutdown().await;
        Ok(())
    }

    /// Answer one request. Returns whether the connection stays open.
    async fn exchange(&mut self, mut request: Request) -> Result<bool, ConnectionError> {
        request.set_remote_address(self.peer.ip().to_string());
        if let Some(local) = self.local {
            request.set_local_address(local);
        }
        let version = request.version();
        let client_keep_alive = request.keep_alive() && !self.shutdown.is_triggered();

        let span = crate::observability::tracing::request_span(request.method(), request.target());
        let mut response = span.in_scope(|| self.dispatcher.handle(request));

        let keep_alive = response.prepare_for(version, client_keep_alive);
        self.write_response(&mut response, version).await?;
        Ok(keep_alive && version != Version::HTTP_09)
    }

    async fn write_response(&mut self, response: &mut Response, version: Version) -> Result<u64, ConnectionError> {
        let mut written = 0u64;
        if version != Version::HTTP_09 {
            self.stream.write_all(&response.head_bytes()).await?;
        }
        match response.take_body() {
            Body::Fixed(bytes) => {
                self.stream.write_all(&bytes).await?;
                written += bytes.len() as u64;
            }
            Body::Stream(mut source) => {
                let framed = version >= Version::HTTP_11
                    && response.headers().has_token("Transfer-Encoding", "chunked");
                written += if framed {
                    chunked::write_chunked(&mut self.stream, source.as_mut()).await?
                } else {
                    chunked::write_raw(&mut self.stream, source.as_mut()).await?
                };
            }
        }
        self.stream.flush().await?;
        Ok(written)
    }

    async fn reject(&mut self) -> Result<(), ConnectionError> {
        let mut response = Response::stock(StatusCode::BAD_REQUEST);
        response.set_header("Connection", "close");
        self.stream.write_all(&response.head_bytes()).await?;
        if let Some(content) = response.content() {
            self.stream.write_all(content).await?;
        }
        self.stream.flush().await?;
        let _ = self.stream.shutdown().await;
        Ok(())
    }
}
