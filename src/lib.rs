//! Embeddable HTTP/1.x engine.
//!
//! Incremental request parsing, keep-alive and pipelined connections,
//! chunked streaming, prefix-routed controllers with an error-handler
//! chain, and a security layer (rules, PBKDF2 passwords, Digest, signed
//! access tokens, CSRF).

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod login;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::EngineConfig;
pub use error::ErrorCondition;
pub use http::server::{HttpServer, ServerError, StopHandle};
pub use http::{Request, Response, StatusCode, Version};
pub use lifecycle::Shutdown;
pub use routing::{Controller, Dispatcher, ErrorHandler};
pub use security::SecurityContext;
