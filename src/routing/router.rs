//! Method and sub-path mount table.
//!
//! # Responsibilities
//! - Store routes as (method, glob, handler) under one mount prefix
//! - Pick the first route matching path and method
//! - Report `MethodNotAllowed` when only the path matched
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in registration order
//! - `HEAD` is served by `GET` routes
//! - Explicit no-match rather than silent default

use crate::error::ErrorCondition;
use crate::http::{Request, Response};
use crate::routing::controller::Controller;
use crate::routing::matcher::{GlobMatcher, Matcher};

type RouteFn = dyn Fn(&Request) -> Response + Send + Sync;

struct Route {
    method: Option<String>,
    matcher: GlobMatcher,
    handler: Box<RouteFn>,
}

impl Route {
    fn accepts_method(&self, method: &str) -> bool {
        match &self.method {
            None => true,
            Some(m) => {
                m.eq_ignore_ascii_case(method)
                    || (m.eq_ignore_ascii_case("GET") && method.eq_ignore_ascii_case("HEAD"))
            }
        }
    }
}

/// Controller dispatching on method and glob sub-path.
pub struct RouteController {
    prefix: String,
    routes: Vec<Route>,
}

impl std::fmt::Debug for RouteController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteController")
            .field("prefix", &self.prefix)
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl RouteController {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            routes: Vec::new(),
        }
    }

    /// Add a route. `method` of `None` accepts every method; `pattern` is
    /// matched against the path below the prefix. A trailing `/` is literal
    /// here: use `/**` for a subtree.
    pub fn route<F>(mut self, method: Option<&str>, pattern: &str, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method: method.map(str::to_ascii_uppercase),
            matcher: GlobMatcher::strict(pattern),
            handler: Box::new(handler),
        });
        self
    }

    pub fn get<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.route(Some("GET"), pattern, handler)
    }

    pub fn post<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.route(Some("POST"), pattern, handler)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Controller for RouteController {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn try_handle(&self, request: &Request) -> Option<Response> {
        match self.dispatch(request) {
            Ok(found) => found,
            Err(condition) => Some(Response::stock(condition.status())),
        }
    }

    fn dispatch(&self, request: &Request) -> Result<Option<Response>, ErrorCondition> {
        let path = self.prefixless_path(request);
        let mut path_matched = false;
        for route in self.routes.iter().filter(|r| r.matcher.matches(&path)) {
            if route.accepts_method(request.method()) {
                return Ok(Some((route.handler)(request)));
            }
            path_matched = true;
        }
        if path_matched {
            Err(ErrorCondition::MethodNotAllowed)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    fn text(body: &'static str) -> impl Fn(&Request) -> Response + Send + Sync {
        move |_| {
            let mut response = Response::new(StatusCode::OK);
            response.set_text(body);
            response
        }
    }

    fn table() -> RouteController {
        RouteController::new("/api")
            .get("/users/*", text("user"))
            .post("/users", text("created"))
            .route(None, "/any/**", text("any"))
    }

    fn body(response: Option<Response>) -> Vec<u8> {
        response.and_then(|r| r.content().map(<[u8]>::to_vec)).unwrap_or_default()
    }

    #[test]
    fn matches_method_and_path() {
        let routes = table();
        let get = Request::builder("GET", "/api/users/7").build();
        assert_eq!(body(routes.dispatch(&get).unwrap()), b"user");

        let head = Request::builder("HEAD", "/api/users/7").build();
        assert!(routes.dispatch(&head).unwrap().is_some());

        let any = Request::builder("DELETE", "/api/any/x/y").build();
        assert_eq!(body(routes.dispatch(&any).unwrap()), b"any");
    }

    #[test]
    fn path_without_method_is_405() {
        let routes = table();
        let request = Request::builder("PUT", "/api/users").build();
        assert!(matches!(
            routes.dispatch(&request),
            Err(ErrorCondition::MethodNotAllowed)
        ));
        assert_eq!(
            routes.try_handle(&request).map(|r| r.status()),
            Some(StatusCode::METHOD_NOT_ALLOWED)
        );
    }

    #[test]
    fn root_route_matches_only_root() {
        let routes = RouteController::new("/")
            .get("/", text("root"))
            .get("/whoami", text("who"));

        let root = Request::builder("GET", "/").build();
        assert_eq!(body(routes.dispatch(&root).unwrap()), b"root");

        let who = Request::builder("GET", "/whoami").build();
        assert_eq!(body(routes.dispatch(&who).unwrap()), b"who");

        let other = Request::builder("POST", "/login").build();
        assert!(routes.dispatch(&other).unwrap().is_none());
    }

    #[test]
    fn unknown_path_declines() {
        let routes = table();
        let request = Request::builder("GET", "/api/nothing").build();
        assert!(routes.dispatch(&request).unwrap().is_none());
    }
}
