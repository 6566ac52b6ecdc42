//! Turns a parsed request into a response.
//!
//! # Data Flow
//! ```text
//! Request
//!     → remote address (peer, or last X-Forwarded-For hop when trusted)
//!     → allowed methods                         → 400
//!     → SecurityContext::validate_request       → 401 / 403
//!     → controllers, registration order, prefix match first
//!     → nothing answered                        → 404
//!     → error-handler chain, newest first, stock page last
//!     → HEAD/OPTIONS body strip, CSRF cookie, Server and request id headers
//!     → access log + metrics
//! ```
//!
//! # Design Decisions
//! - Controller and error-handler panics become `Internal` (500)
//! - The dispatcher is immutable once the server starts; it is shared by
//!   every connection through an `Arc`

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::ErrorCondition;
use crate::http::response::DEFAULT_SERVER_NAME;
use crate::http::{Request, Response, StatusCode};
use crate::observability::logging::RequestLog;
use crate::observability::metrics;
use crate::routing::controller::Controller;
use crate::routing::error_handler::ErrorHandler;
use crate::routing::matcher::{Matcher, PathPrefixMatcher};
use crate::security::{csrf, SecurityContext};

struct Mount {
    matcher: PathPrefixMatcher,
    controller: Arc<dyn Controller>,
}

/// Controllers, error handlers and the optional security context.
pub struct Dispatcher {
    mounts: Vec<Mount>,
    error_handlers: Vec<Arc<dyn ErrorHandler>>,
    security: Option<Arc<SecurityContext>>,
    allowed_methods: Option<HashSet<String>>,
    trust_forwarded: bool,
    server_name: String,
    request_id_header: Option<String>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<&str> = self.mounts.iter().map(|m| m.matcher.prefix()).collect();
        f.debug_struct("Dispatcher")
            .field("controllers", &prefixes)
            .field("error_handlers", &self.error_handlers.len())
            .field("security", &self.security)
            .field("allowed_methods", &self.allowed_methods)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            mounts: Vec::new(),
            error_handlers: Vec::new(),
            security: None,
            allowed_methods: None,
            trust_forwarded: false,
            server_name: DEFAULT_SERVER_NAME.to_string(),
            request_id_header: None,
        }
    }

    pub fn add_controller(&mut self, controller: impl Controller + 'static) {
        self.add_shared_controller(Arc::new(controller));
    }

    pub fn add_shared_controller(&mut self, controller: Arc<dyn Controller>) {
        tracing::debug!(prefix = controller.prefix(), "Controller registered");
        self.mounts.push(Mount {
            matcher: PathPrefixMatcher::new(controller.prefix()),
            controller,
        });
    }

    /// Mount `controller` ahead of every controller registered so far.
    pub fn add_priority_controller(&mut self, controller: impl Controller + 'static) {
        let controller: Arc<dyn Controller> = Arc::new(controller);
        tracing::debug!(prefix = controller.prefix(), "Priority controller registered");
        self.mounts.insert(
            0,
            Mount {
                matcher: PathPrefixMatcher::new(controller.prefix()),
                controller,
            },
        );
    }

    pub fn with_controller(mut self, controller: impl Controller + 'static) -> Self {
        self.add_controller(controller);
        self
    }

    /// Handlers added later are consulted first.
    pub fn add_error_handler(&mut self, handler: impl ErrorHandler + 'static) {
        self.error_handlers.push(Arc::new(handler));
    }

    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.add_error_handler(handler);
        self
    }

    pub fn with_security(mut self, security: Arc<SecurityContext>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn security(&self) -> Option<&Arc<SecurityContext>> {
        self.security.as_ref()
    }

    /// Restrict accepted methods; an empty list accepts everything.
    pub fn with_allowed_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: HashSet<String> = methods
            .into_iter()
            .map(|m| m.as_ref().to_ascii_uppercase())
            .collect();
        self.allowed_methods = (!set.is_empty()).then_some(set);
        self
    }

    pub fn with_trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Echo the request id under `header`; empty disables it.
    pub fn with_request_id_header(mut self, header: impl Into<String>) -> Self {
        let header = header.into();
        self.request_id_header = (!header.is_empty()).then_some(header);
        self
    }

    pub fn controller_count(&self) -> usize {
        self.mounts.len()
    }

    fn assign_remote_address(&self, request: &mut Request) {
        if self.trust_forwarded {
            let forwarded = request
                .headers()
                .get_all("X-Forwarded-For")
                .last()
                .and_then(|v| v.rsplit(',').next())
                .map(|hop| hop.trim().to_string())
                .filter(|hop| !hop.is_empty());
            if let Some(hop) = forwarded {
                request.set_remote_address(hop);
            }
        }
        if request.remote_address().is_empty() {
            request.set_remote_address("-");
        }
    }

    fn check_method(&self, request: &Request) -> Result<(), ErrorCondition> {
        match &self.allowed_methods {
            Some(allowed) if !allowed.contains(&request.method().to_ascii_uppercase()) => {
                Err(ErrorCondition::Status(StatusCode::BAD_REQUEST))
            }
            _ => Ok(()),
        }
    }

    fn authorize(
        &self,
        request: &mut Request,
        log: &mut RequestLog,
    ) -> Result<Option<String>, ErrorCondition> {
        match &self.security {
            Some(security) => Ok(security.validate_request(request, log)?.fresh_csrf),
            None => Ok(None),
        }
    }

    fn route(&self, request: &Request) -> Result<Response, ErrorCondition> {
        let path = request.path();
        for mount in self.mounts.iter().filter(|m| m.matcher.matches(&path)) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| mount.controller.dispatch(request)));
            match outcome {
                Ok(Ok(Some(response))) => return Ok(response),
                Ok(Ok(None)) => continue,
                Ok(Err(condition)) => return Err(condition),
                Err(payload) => {
                    let message = panic_message(payload);
                    tracing::error!(prefix = mount.matcher.prefix(), error = %message, "Controller panicked");
                    return Err(ErrorCondition::Internal(message));
                }
            }
        }
        Err(ErrorCondition::NotFound)
    }

    /// Run the error-handler chain for `condition`.
    pub fn handle_error(&self, request: &Request, condition: &ErrorCondition) -> Response {
        for handler in self.error_handlers.iter().rev() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request, condition))) {
                Ok(Some(response)) => return response,
                Ok(None) => {}
                Err(payload) => {
                    tracing::error!(error = %panic_message(payload), "Error handler panicked");
                }
            }
        }
        Response::stock(condition.status())
    }

    fn challenge(&self, condition: &ErrorCondition, response: &mut Response) {
        if response.status() != StatusCode::UNAUTHORIZED || condition.realm().is_none() {
            return;
        }
        if let Some(header) = self
            .security
            .as_ref()
            .and_then(|s| s.challenge_header(condition.is_stale()))
        {
            response.set_header("WWW-Authenticate", header);
        }
    }

    /// Produce the response for one request.
    pub fn handle(&self, mut request: Request) -> Response {
        self.assign_remote_address(&mut request);
        let mut log = RequestLog::new(&request);

        let admitted = self
            .check_method(&request)
            .and_then(|()| self.authorize(&mut request, &mut log));

        let (mut fresh_csrf, outcome) = match admitted {
            Ok(fresh) => (fresh, self.route(&request)),
            Err(condition) => (None, Err(condition)),
        };

        let mut response = match outcome {
            Ok(response) => response,
            Err(condition) => {
                log.note(condition.to_string());
                if matches!(
                    condition,
                    ErrorCondition::Unauthorized { .. }
                        | ErrorCondition::UnauthorizedStale { .. }
                        | ErrorCondition::Forbidden
                ) {
                    metrics::record_auth_failure(&condition);
                }
                if let Some(security) = &self.security {
                    if request.cookie(csrf::CSRF_COOKIE).is_none() {
                        fresh_csrf = Some(security.get_csrf_token(&mut request));
                    }
                }
                let mut response = self.handle_error(&request, &condition);
                self.challenge(&condition, &mut response);
                response
            }
        };

        self.finish(&request, &mut response, fresh_csrf, &log);
        response
    }

    fn finish(
        &self,
        request: &Request,
        response: &mut Response,
        fresh_csrf: Option<String>,
        log: &RequestLog,
    ) {
        let method = request.method();
        if method.eq_ignore_ascii_case("HEAD") {
            response.strip_body();
        } else if method.eq_ignore_ascii_case("OPTIONS") {
            response.strip_body();
            response.headers_mut().remove("Transfer-Encoding");
            response.set_header("Content-Length", "0");
        }

        if let Some(token) = fresh_csrf {
            csrf::set_cookie(response, &token);
        }
        response.set_header("Server", self.server_name.clone());
        if let Some(header) = &self.request_id_header {
            response.set_header(header.clone(), log.request_id().to_string());
        }

        log.finish(response);
        metrics::record_request(method, response.status().as_u16(), log.started());
    }
}
