//! Error-handler chain members.
//!
//! Handlers are consulted most recently added first. Each may build a
//! reply for the condition or decline so the next one gets a chance.

use serde_json::json;

use crate::error::ErrorCondition;
use crate::http::{Request, Response};

pub trait ErrorHandler: Send + Sync {
    fn handle(&self, request: &Request, condition: &ErrorCondition) -> Option<Response>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Request, &ErrorCondition) -> Option<Response> + Send + Sync,
{
    fn handle(&self, request: &Request, condition: &ErrorCondition) -> Option<Response> {
        self(request, condition)
    }
}

/// Answers every condition with the stock HTML page.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockErrorHandler;

impl ErrorHandler for StockErrorHandler {
    fn handle(&self, _request: &Request, condition: &ErrorCondition) -> Option<Response> {
        Some(Response::stock(condition.status()))
    }
}

/// Answers clients that accept `application/json` with a JSON error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorHandler;

impl ErrorHandler for JsonErrorHandler {
    fn handle(&self, request: &Request, condition: &ErrorCondition) -> Option<Response> {
        if !request.accepts("application/json") {
            return None;
        }
        let status = condition.status();
        let mut response = Response::new(status);
        let body = json!({
            "status": status.as_u16(),
            "error": condition.to_string(),
        });
        response.set_json(&body).ok()?;
        Some(response)
    }
}
