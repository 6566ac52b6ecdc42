//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → dispatcher.rs (method filter, security, controller loop)
//!     → matcher.rs (segment-wise prefix, glob)
//!     → controller.rs / router.rs (answer or decline)
//!     → error_handler.rs (conditions become replies)
//! ```
//!
//! # Design Decisions
//! - Controllers registered at startup, immutable at runtime
//! - No regex in hot path (prefix and glob matching only)
//! - Deterministic: same input always matches same controller
//! - First match wins (registration order)

pub mod controller;
pub mod dispatcher;
pub mod error_handler;
pub mod matcher;
pub mod router;

pub use controller::{Controller, FnController, Serialized};
pub use dispatcher::Dispatcher;
pub use error_handler::{ErrorHandler, JsonErrorHandler, StockErrorHandler};
pub use matcher::{glob_match, GlobMatcher, Matcher, PathPrefixMatcher};
pub use router::RouteController;
