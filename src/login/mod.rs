//! Form based sign-in.
//!
//! # Data Flow
//! ```text
//! GET  /login   → form with csrf token and return uri
//! POST /login   → verify_username_password → access_token cookie → 303 uri
//!               → bad password                → form again, 401
//! /logout       → delete access_token         → 303
//! Unauthorized anywhere else → LoginErrorHandler → form, 401
//! ```

pub mod form;

use std::sync::Arc;

use crate::error::ErrorCondition;
use crate::http::{Request, Response, StatusCode};
use crate::routing::{Controller, Dispatcher, ErrorHandler};
use crate::security::{csrf, AuthRule, SecurityContext};

pub use form::LoginForm;

pub const LOGIN_PATH: &str = "/login";
pub const LOGOUT_PATH: &str = "/logout";

/// Only local absolute paths are honoured as redirect targets.
fn redirect_target(request: &Request) -> String {
    request
        .parameter("uri")
        .filter(|uri| {
            uri.starts_with('/')
                && !uri.starts_with("//")
                && !uri.starts_with("/\\")
                && !uri.chars().any(char::is_control)
        })
        .unwrap_or_else(|| "/".to_string())
}

fn form_page(form: &LoginForm, status: StatusCode) -> Response {
    let mut response = Response::new(status);
    response.set_html(form.render(LOGIN_PATH));
    response
}

/// Serves the sign-in and sign-out endpoints.
#[derive(Debug)]
pub struct LoginController {
    security: Arc<SecurityContext>,
}

impl LoginController {
    pub fn new(security: Arc<SecurityContext>) -> Self {
        Self { security }
    }

    fn show_form(&self, request: &Request) -> Response {
        let form = LoginForm {
            csrf: request.cookie(csrf::CSRF_COOKIE).unwrap_or_default(),
            uri: request.parameter("uri").unwrap_or_default(),
            ..LoginForm::default()
        };
        form_page(&form, StatusCode::OK)
    }

    fn sign_in(&self, request: &Request) -> Result<Response, ErrorCondition> {
        if !csrf::verify(request) {
            return Err(ErrorCondition::Forbidden);
        }
        let username = request.parameter("username").unwrap_or_default();
        let password = request.parameter("password").unwrap_or_default();
        let target = redirect_target(request);

        match self.security.verify_username_password(&username, &password) {
            Ok(credentials) => {
                let mut response = Response::redirect(&target, StatusCode::SEE_OTHER);
                self.security
                    .add_authorization_headers(&mut response, &credentials)
                    .map_err(|e| ErrorCondition::Internal(e.to_string()))?;
                tracing::info!(user = %username, "User signed in");
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(user = %username, error = %e, "Sign-in rejected");
                let form = LoginForm {
                    csrf: request.cookie(csrf::CSRF_COOKIE).unwrap_or_default(),
                    uri: target,
                    username,
                    invalid: true,
                };
                Ok(form_page(&form, StatusCode::UNAUTHORIZED))
            }
        }
    }

    fn sign_out(&self, request: &Request) -> Response {
        let mut response = Response::redirect(&redirect_target(request), StatusCode::SEE_OTHER);
        self.security.remove_authorization(&mut response);
        response
    }
}

impl Controller for LoginController {
    fn prefix(&self) -> &str {
        "/"
    }

    fn try_handle(&self, request: &Request) -> Option<Response> {
        self.dispatch(request)
            .unwrap_or_else(|condition| Some(Response::stock(condition.status())))
    }

    fn dispatch(&self, request: &Request) -> Result<Option<Response>, ErrorCondition> {
        let path = request.path();
        let method = request.method().to_ascii_uppercase();
        match (path.as_str(), method.as_str()) {
            (LOGIN_PATH, "GET" | "HEAD") => Ok(Some(self.show_form(request))),
            (LOGIN_PATH, "POST") => self.sign_in(request).map(Some),
            (LOGIN_PATH, _) => Err(ErrorCondition::MethodNotAllowed),
            (LOGOUT_PATH, "GET" | "POST") => Ok(Some(self.sign_out(request))),
            (LOGOUT_PATH, _) => Err(ErrorCondition::MethodNotAllowed),
            _ => Ok(None),
        }
    }
}

/// Answers authentication failures with the sign-in form.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginErrorHandler;

impl ErrorHandler for LoginErrorHandler {
    fn handle(&self, request: &Request, condition: &ErrorCondition) -> Option<Response> {
        if condition.realm().is_none() {
            return None;
        }
        let form = LoginForm {
            csrf: request.cookie(csrf::CSRF_COOKIE).unwrap_or_default(),
            uri: request.target().to_string(),
            ..LoginForm::default()
        };
        Some(form_page(&form, StatusCode::UNAUTHORIZED))
    }
}

/// Register the login controller and its error handler.
///
/// `/login` and `/logout` are made public ahead of every other rule, and
/// the controller is consulted before the application's controllers.
pub fn install(mut dispatcher: Dispatcher, mut security: SecurityContext) -> Dispatcher {
    security.add_priority_rule(AuthRule::public("/login;/logout"));
    let security = Arc::new(security);
    dispatcher.add_priority_controller(LoginController::new(Arc::clone(&security)));
    dispatcher
        .with_security(security)
        .with_error_handler(LoginErrorHandler)
}
