//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (one actor per socket: parse, dispatch, write)
//!     → back to reading, or closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS terminates below this layer, never here

pub mod connection;
pub mod listener;

pub use connection::{Connection, ConnectionError, ConnectionTracker};
pub use listener::{Listener, ListenerError};
