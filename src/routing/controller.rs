//! Route handlers mounted under a path prefix.
//!
//! # Responsibilities
//! - Define the `Controller` contract used by the dispatcher
//! - Closure controllers for small handlers
//! - Opt-in serialization for handlers that are not reentrant
//!
//! # Design Decisions
//! - Controllers are shared between worker threads (`Send + Sync`)
//! - Returning `None` means "not my route"; the next controller is tried
//! - Concurrency inside a controller is its own business unless wrapped
//!   in [`Serialized`]

use std::sync::{Mutex, PoisonError};

use crate::error::ErrorCondition;
use crate::http::{Request, Response};
use crate::routing::matcher::PathPrefixMatcher;

/// A route handler bound to a path prefix.
pub trait Controller: Send + Sync {
    /// Mount point. Matched segment-wise against the request path.
    fn prefix(&self) -> &str;

    /// Answer the request, or decline with `None`.
    fn try_handle(&self, request: &Request) -> Option<Response>;

    /// Entry point used by the dispatcher.
    ///
    /// Override to hand a condition to the error-handler chain instead of
    /// building the reply here.
    fn dispatch(&self, request: &Request) -> Result<Option<Response>, ErrorCondition> {
        Ok(self.try_handle(request))
    }

    /// Request path with the mount prefix removed.
    fn prefixless_path(&self, request: &Request) -> String {
        let path = request.path();
        PathPrefixMatcher::new(self.prefix())
            .strip(&path)
            .map(str::to_string)
            .unwrap_or(path)
    }
}

impl<C: Controller + ?Sized> Controller for std::sync::Arc<C> {
    fn prefix(&self) -> &str {
        (**self).prefix()
    }

    fn try_handle(&self, request: &Request) -> Option<Response> {
        (**self).try_handle(request)
    }

    fn dispatch(&self, request: &Request) -> Result<Option<Response>, ErrorCondition> {
        (**self).dispatch(request)
    }
}

type HandlerFn = dyn Fn(&Request) -> Option<Response> + Send + Sync;

/// Controller backed by a closure.
pub struct FnController {
    prefix: String,
    handler: Box<HandlerFn>,
}

impl FnController {
    pub fn new<F>(prefix: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            handler: Box::new(handler),
        }
    }
}

impl std::fmt::Debug for FnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnController")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl Controller for FnController {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn try_handle(&self, request: &Request) -> Option<Response> {
        (self.handler)(request)
    }
}

/// Runs at most one invocation of the inner controller at a time.
#[derive(Debug)]
pub struct Serialized<C> {
    inner: C,
    lock: Mutex<()>,
}

impl<C: Controller> Serialized<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Controller> Controller for Serialized<C> {
    fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    fn try_handle(&self, request: &Request) -> Option<Response> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.try_handle(request)
    }

    fn dispatch(&self, request: &Request) -> Result<Option<Response>, ErrorCondition> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.dispatch(request)
    }
}
