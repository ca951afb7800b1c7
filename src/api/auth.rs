use axum::{
    Json,
    extract::{FromRequestParts, Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use super::cookies::{
    ACCESS_COOKIE, REFRESH_COOKIE, clear_session_cookies, cookie_value, set_session_cookies,
};
use super::meta::ClientMeta;
use super::types::{
    ChangePasswordRequest, LoggedOutResponse, LoginRequest, PasswordResetResponse,
    ResetPasswordRequest, SetupBody, SetupCompletedResponse, SetupStatusResponse, UserEnvelope,
};
use super::validation;
use super::{ApiError, ApiResponse, AppState};
use crate::domain::{CredentialSource, Principal};
use crate::services::UserView;

// ============================================================================
// Middleware
// ============================================================================

/// Access token from the `accessToken` cookie, falling back to
/// `Authorization: Bearer`.
fn extract_access_token(headers: &HeaderMap) -> Option<(String, CredentialSource)> {
    let jar = CookieJar::from_headers(headers);
    if let Some(token) = cookie_value(&jar, ACCESS_COOKIE) {
        return Some((token.to_string(), CredentialSource::Cookie));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_string(), CredentialSource::Bearer))
}

/// Resolves the access token to a [`Principal`] and stores it in request
/// extensions. Stale generations and inactive users are rejected here.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (token, source) =
        extract_access_token(request.headers()).ok_or(ApiError::Unauthenticated)?;

    let authenticated = state.auth_service().authenticate(&token).await?;

    let principal = Principal {
        user_id: authenticated.payload.user_id,
        role: authenticated.role,
        session_id: authenticated.payload.session_id,
        generation: authenticated.payload.generation,
        must_change_password: authenticated.user.must_change_password,
        source,
    };

    tracing::Span::current().record("user_id", principal.user_id.value());
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /auth/setup-status
pub async fn setup_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SetupStatusResponse>>, ApiError> {
    let setup_required = state.auth_service().setup_required().await?;
    Ok(Json(ApiResponse::success(SetupStatusResponse { setup_required })))
}

/// POST /auth/setup
/// Creates the first ADMIN. Does not log them in.
pub async fn complete_setup(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    payload: Result<Json<SetupBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<SetupCompletedResponse>>), ApiError> {
    let Json(body) = payload?;
    let request = validation::validate_setup(body)?;

    state.auth_service().complete_setup(request, &ctx).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SetupCompletedResponse {
            setup_completed: true,
        })),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<ApiResponse<UserEnvelope>>), ApiError> {
    let Json(body) = payload?;
    validation::validate_login(&body)?;

    let (user, session) = state
        .auth_service()
        .login(&body.email, &body.password, &ctx)
        .await?;

    let jar = set_session_cookies(jar, &state.config().server, &session);
    Ok((jar, Json(ApiResponse::success(UserEnvelope { user }))))
}

/// POST /auth/refresh
/// Any failure clears the auth cookies along with the 401.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse<UserEnvelope>>), (CookieJar, ApiError)> {
    let server = &state.config().server;

    let Some(token) = cookie_value(&jar, REFRESH_COOKIE).map(ToString::to_string) else {
        return Err((jar, ApiError::Unauthenticated));
    };

    match state.auth_service().refresh(&token, &ctx).await {
        Ok((user, session)) => {
            let jar = set_session_cookies(jar, server, &session);
            Ok((jar, Json(ApiResponse::success(UserEnvelope { user }))))
        }
        Err(err) => Err((clear_session_cookies(jar, server), ApiError::from(err))),
    }
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<LoggedOutResponse>>) {
    state
        .auth_service()
        .logout(cookie_value(&jar, REFRESH_COOKIE), &ctx)
        .await;

    let jar = clear_session_cookies(jar, &state.config().server);
    (
        jar,
        Json(ApiResponse::success(LoggedOutResponse { logged_out: true })),
    )
}

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    let user = state.auth_service().current_user(principal.user_id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /auth/change-password
/// Revokes every session of the caller and hands back a fresh one.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    principal: Principal,
    jar: CookieJar,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<ApiResponse<UserEnvelope>>), ApiError> {
    let Json(body) = payload?;
    validation::validate_change_password(&body)?;

    let (user, session) = state
        .auth_service()
        .change_password(
            principal.user_id,
            &body.old_password,
            &body.new_password,
            &ctx,
        )
        .await?;

    let jar = set_session_cookies(jar, &state.config().server, &session);
    Ok((jar, Json(ApiResponse::success(UserEnvelope { user }))))
}

/// POST /auth/reset-password
/// Clears the auth cookies so the caller has to log in again.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    jar: CookieJar,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<ApiResponse<PasswordResetResponse>>), ApiError> {
    let Json(body) = payload?;
    validation::validate_reset_password(&body)?;

    state
        .auth_service()
        .reset_password(&body.email, &body.code, &body.new_password, &ctx)
        .await?;

    let jar = clear_session_cookies(jar, &state.config().server);
    Ok((
        jar,
        Json(ApiResponse::success(PasswordResetResponse {
            password_reset: true,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_preferred_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("accessToken=from-cookie"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );

        let (token, source) = extract_access_token(&headers).unwrap();
        assert_eq!(token, "from-cookie");
        assert_eq!(source, CredentialSource::Cookie);
    }

    #[test]
    fn test_bearer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer  abc.def.ghi "),
        );

        let (token, source) = extract_access_token(&headers).unwrap();
        assert_eq!(token, "abc.def.ghi");
        assert_eq!(source, CredentialSource::Bearer);
    }

    #[test]
    fn test_no_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert!(extract_access_token(&headers).is_none());
        assert!(extract_access_token(&HeaderMap::new()).is_none());
    }
}
