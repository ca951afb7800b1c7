//! Double-submit CSRF checks: the `XSRF-TOKEN` cookie must equal the
//! `x-csrf-token` header.

use axum::{
    extract::Request,
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use super::ApiError;
use super::cookies::{CSRF_COOKIE, cookie_value};
use crate::domain::{CredentialSource, Principal};
use crate::security::secret::constant_time_eq;

pub const CSRF_HEADER: &str = "x-csrf-token";

#[must_use]
pub fn csrf_matches(headers: &HeaderMap) -> bool {
    let jar = CookieJar::from_headers(headers);
    let Some(cookie) = cookie_value(&jar, CSRF_COOKIE) else {
        return false;
    };
    let header = headers
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    constant_time_eq(cookie, header)
}

fn rejected(request: &Request) -> Response {
    warn!(path = %request.uri().path(), "CSRF validation failed");
    ApiError::Forbidden("CSRF validation failed".to_string()).into_response()
}

/// Unconditional check for the cookie-only auth endpoints.
pub async fn require_csrf(request: Request, next: Next) -> Response {
    if !csrf_matches(request.headers()) {
        return rejected(&request);
    }
    next.run(request).await
}

const fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Checks state-changing requests authenticated by the access cookie.
/// Bearer callers are exempt. Runs after the auth middleware.
pub async fn csrf_for_state_change(request: Request, next: Next) -> Response {
    let cookie_auth = request
        .extensions()
        .get::<Principal>()
        .is_some_and(|p| p.source == CredentialSource::Cookie);

    if cookie_auth && !is_safe(request.method()) && !csrf_matches(request.headers()) {
        return rejected(&request);
    }
    next.run(request).await
}
