//! Cross-site request forgery tokens.
//!
//! A token is minted on first contact and stored in the `csrf-token`
//! cookie. State-changing requests must echo it back, either in the
//! `X-CSRF-Token` header or in the `_csrf` form field.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

use crate::http::{Request, Response};
use crate::security::password::constant_time_eq;

pub const CSRF_COOKIE: &str = "csrf-token";
pub const CSRF_FIELD: &str = "_csrf";
pub const CSRF_HEADER: &str = "X-CSRF-Token";

const TOKEN_BYTES: usize = 32;

/// Fresh random token, base64url without padding.
pub fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Methods that must carry a token.
pub fn is_state_changing(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "DELETE" | "PATCH"
    )
}

/// Token the client submitted with this request, header first.
pub fn submitted_token(request: &Request) -> Option<String> {
    request
        .header(CSRF_HEADER)
        .map(str::to_string)
        .or_else(|| request.parameter(CSRF_FIELD))
}

/// True when the submitted token equals the cookie value.
pub fn verify(request: &Request) -> bool {
    match (submitted_token(request), request.cookie(CSRF_COOKIE)) {
        (Some(submitted), Some(expected)) if !expected.is_empty() => {
            constant_time_eq(submitted.as_bytes(), expected.as_bytes())
        }
        _ => false,
    }
}

/// Attach `token` as the CSRF cookie.
pub fn set_cookie(response: &mut Response, token: &str) {
    response.set_cookie(
        CSRF_COOKIE,
        token,
        &[("HttpOnly", ""), ("SameSite", "Lax"), ("Path", "/")],
    );
}
