//! Dispatch-level error conditions.
//!
//! Every failure that reaches the error-handler chain is one of these.
//! Each maps to exactly one status code.

use crate::http::StatusCode;

/// Why a request could not be answered normally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorCondition {
    #[error("malformed request")]
    MalformedRequest,
    #[error("authentication required for realm {realm}")]
    Unauthorized { realm: String },
    #[error("stale nonce for realm {realm}")]
    UnauthorizedStale { realm: String },
    #[error("access forbidden")]
    Forbidden,
    #[error("no handler for this location")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0}")]
    Status(StatusCode),
}

impl ErrorCondition {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCondition::MalformedRequest => StatusCode::BAD_REQUEST,
            ErrorCondition::Unauthorized { .. } | ErrorCondition::UnauthorizedStale { .. } => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCondition::Forbidden => StatusCode::FORBIDDEN,
            ErrorCondition::NotFound => StatusCode::NOT_FOUND,
            ErrorCondition::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCondition::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCondition::Status(status) => *status,
        }
    }

    /// Realm to challenge for, when this is an authentication failure.
    pub fn realm(&self) -> Option<&str> {
        match self {
            ErrorCondition::Unauthorized { realm } | ErrorCondition::UnauthorizedStale { realm } => {
                Some(realm)
            }
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, ErrorCondition::UnauthorizedStale { .. })
    }
}

impl From<StatusCode> for ErrorCondition {
    fn from(status: StatusCode) -> Self {
        ErrorCondition::Status(status)
    }
}
