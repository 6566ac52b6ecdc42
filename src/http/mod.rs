//! HTTP/1.x message model and wire codec.
//!
//! # Data Flow
//! ```text
//! socket bytes
//!     → parser.rs (incremental state machine)
//!     → request.rs (Request handed to the dispatcher)
//!     → response.rs (Response built by controllers / error handlers)
//!     → chunked.rs (framing for streamed bodies)
//!     → socket
//! ```
//!
//! # Design Decisions
//! - Headers keep insertion order and compare names case-insensitively
//! - The parser owns all intermediate state; no globals
//! - HTTP/2 and TLS are out of reach of this module

pub mod chunked;
pub mod header;
pub mod parser;
pub mod request;
pub mod response;
pub mod server;
pub mod status;
pub mod version;

pub use header::{Header, Headers};
pub use parser::{ParseError, ParseStatus, ParserLimits, RequestParser, ResponseParser};
pub use request::{Request, RequestBuilder};
pub use response::{Body, BodySource, IterSource, ReaderSource, Response};
pub use server::HttpServer;
pub use status::StatusCode;
pub use version::Version;
