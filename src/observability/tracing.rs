//! Spans for connection and request processing.

use std::net::SocketAddr;

use tracing::Span;

use crate::net::connection::ConnectionId;

/// Span wrapping the whole life of one connection actor.
pub fn connection_span(id: ConnectionId, peer: SocketAddr) -> Span {
    tracing::info_span!("connection", connection_id = %id, peer = %peer)
}

/// Span for one request exchange on a connection.
pub fn request_span(method: &str, target: &str) -> Span {
    tracing::debug_span!("request", method = %method, target = %target)
}
