//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after parsing, before any controller):
//!     → context.rs (token cookie, digest header, rules, CSRF)
//!         → token.rs    (HS256 bearer token in the access_token cookie)
//!         → digest.rs   (RFC 2617 challenge table, replay and staleness)
//!         → rules.rs    (first matching glob rule decides)
//!         → csrf.rs     (cookie vs. submitted token)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Fail closed: any check that cannot complete denies the request
//! - Login failures never reveal whether the user exists
//! - The nonce table is the only shared mutable state

pub mod context;
pub mod credentials;
pub mod csrf;
pub mod digest;
pub mod password;
pub mod rules;
pub mod token;
pub mod users;

pub use context::{SecurityContext, SecurityError, Validation, ACCESS_TOKEN_COOKIE};
pub use credentials::Credentials;
pub use digest::{DigestAuthenticator, DigestUserStore, SimpleDigestStore};
pub use password::{PasswordEncoder, Pbkdf2Sha256Encoder};
pub use rules::{AuthRule, RuleSet};
pub use token::{TokenError, TokenSigner};
pub use users::{SimpleUserService, UserDetails, UserService};
