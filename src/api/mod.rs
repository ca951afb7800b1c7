use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::domain::Capability;
use crate::security::LoginLimiters;
use crate::services::{AuditService, AuthService, UserAdminService};
use crate::state::SharedState;

mod audit_logs;
pub mod auth;
pub mod cookies;
pub mod csrf;
mod error;
pub mod guards;
pub mod meta;
mod observability;
mod types;
mod users;
mod validation;

pub use error::ApiError;
pub use guards::require_capability;
pub use meta::ClientMeta;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn user_admin(&self) -> &Arc<dyn UserAdminService> {
        &self.shared.user_admin_service
    }

    #[must_use]
    pub fn audit(&self) -> &AuditService {
        &self.shared.audit
    }

    #[must_use]
    pub fn limiters(&self) -> &LoginLimiters {
        &self.shared.limiters
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

/// The full HTTP surface under `/api`.
pub fn router(state: Arc<AppState>) -> Router {
    router_with(state, Router::new())
}

/// Like [`router`], with extra routes mounted behind the same auth, CSRF and
/// password-change layers as `/users`. Collaborator handlers apply
/// [`require_capability`] themselves and read the
/// [`Principal`](crate::domain::Principal) from request extensions.
pub fn router_with(state: Arc<AppState>, collaborators: Router<Arc<AppState>>) -> Router {
    let cors_layer = cors_layer(&state.config().server.cors_allowed_origins);

    // Cookie-only endpoints; the refresh cookie is scoped to /api/auth.
    let session_routes = Router::new()
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route_layer(middleware::from_fn(csrf::require_csrf));

    // Reachable while a password change is pending.
    let account_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/change-password", post(auth::change_password))
        .route_layer(middleware::from_fn(csrf::csrf_for_state_change))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let protected_routes = create_protected_router()
        .merge(collaborators)
        .route_layer(middleware::from_fn(guards::password_change_resolved))
        .route_layer(middleware::from_fn(csrf::csrf_for_state_change))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let api_router = Router::new()
        .route("/health", get(observability::health))
        .route("/auth/setup-status", get(auth::setup_status))
        .route("/auth/setup", post(auth::complete_setup))
        .route("/auth/login", post(auth::login))
        .route("/auth/reset-password", post(auth::reset_password))
        .merge(session_routes)
        .merge(account_routes)
        .merge(protected_routes)
        .with_state(state);

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_protected_router() -> Router<Arc<AppState>> {
    let users = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/{id}", put(users::update_user))
        .route("/users/{id}/deactivate", patch(users::deactivate_user))
        .route(
            "/users/{id}/reset-password",
            post(users::issue_password_reset),
        )
        .route_layer(middleware::from_fn(require_capability(
            Capability::UsersManage,
        )));

    let audit = Router::new()
        .route("/audit-logs", get(audit_logs::list_audit_logs))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn(require_capability(Capability::AuditRead)));

    Router::new().merge(users).merge(audit)
}

/// Credentialed CORS for listed origins. A `*` entry disables credentials,
/// which browsers refuse to combine with a wildcard.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|s| s.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(csrf::CSRF_HEADER),
        ])
}
