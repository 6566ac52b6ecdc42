//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (pretty or JSON)
//! - Carry per-request access-log data through dispatch (`RequestLog`)
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level from config, overridable with `RUST_LOG`
//! - One access-log event per request, never a global buffer

use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::http::{Request, Response};

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("http_engine={},engine_cli={}", level, level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Access-log record for one request.
///
/// Created when dispatch starts, annotated by the security layer and the
/// dispatcher, and emitted once with [`RequestLog::finish`].
#[derive(Debug, Clone)]
pub struct RequestLog {
    request_id: Uuid,
    started: Instant,
    client: String,
    user: Option<String>,
    method: String,
    target: String,
    version: String,
    referer: Option<String>,
    user_agent: Option<String>,
    notes: Vec<String>,
}

impl RequestLog {
    pub fn new(request: &Request) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started: Instant::now(),
            client: request.remote_address().to_string(),
            user: None,
            method: request.method().to_string(),
            target: request.target().to_string(),
            version: request.version().to_string(),
            referer: request.header("Referer").map(str::to_string),
            user_agent: request.header("User-Agent").map(str::to_string),
            notes: Vec::new(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn set_client(&mut self, client: impl Into<String>) {
        self.client = client.into();
    }

    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = Some(user.into());
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Append a free-form note.
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Emit the access-log event.
    pub fn finish(&self, response: &Response) {
        let status = response.status().as_u16();
        let notes = self.notes.join("; ");
        tracing::info!(
            request_id = %self.request_id,
            client = %self.client,
            user = self.user.as_deref().unwrap_or("-"),
            method = %self.method,
            target = %self.target,
            version = %self.version,
            status = status,
            bytes = response.size(),
            referer = self.referer.as_deref().unwrap_or("-"),
            user_agent = self.user_agent.as_deref().unwrap_or("-"),
            elapsed_ms = self.elapsed_ms() as u64,
            notes = %notes,
            "Request completed"
        );
    }
}
