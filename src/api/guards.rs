//! Per-route authorization layers. All of them read the [`Principal`] the
//! auth middleware attached, so they must sit inside it.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::future::Future;
use std::pin::Pin;
use tracing::warn;

use super::ApiError;
use crate::domain::{Capability, Principal};

pub type GuardFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Blocks everything behind it while the caller still has to change their
/// password. `/auth/change-password` lives outside this layer.
pub async fn password_change_resolved(request: Request, next: Next) -> Response {
    if request
        .extensions()
        .get::<Principal>()
        .is_some_and(|p| p.must_change_password)
    {
        return ApiError::Forbidden("Password change required".to_string()).into_response();
    }
    next.run(request).await
}

/// Route layer admitting only roles that hold `capability`.
///
/// ```ignore
/// Router::new().route(
///     "/members",
///     post(create_member)
///         .route_layer(middleware::from_fn(require_capability(Capability::MembersWrite))),
/// )
/// ```
pub fn require_capability(
    capability: Capability,
) -> impl Fn(Request, Next) -> GuardFuture + Clone + Send + Sync + 'static {
    move |request, next| Box::pin(check_capability(capability, request, next))
}

async fn check_capability(capability: Capability, request: Request, next: Next) -> Response {
    let Some(principal) = request.extensions().get::<Principal>() else {
        return ApiError::Unauthenticated.into_response();
    };

    if !principal.can(capability) {
        warn!(
            user_id = %principal.user_id,
            role = %principal.role,
            capability = %capability,
            "Capability denied"
        );
        return ApiError::forbidden().into_response();
    }

    next.run(request).await
}
