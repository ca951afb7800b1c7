//! Domain service for the credential lifecycle.
//!
//! Bootstrap, login with lockout, refresh rotation with reuse containment,
//! logout, password change and self-service reset.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{RequestContext, Role, UserId};
use crate::entities::users;
use crate::security::TokenPayload;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email, wrong password, inactive or locked account. Callers
    /// cannot tell these apart.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("Too many login attempts, try again later")]
    TooManyAttempts { retry_after_secs: u64 },

    #[error("{0}")]
    WeakPassword(String),

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Invalid or expired reset code")]
    InvalidResetCode,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<crate::security::TokenError> for AuthError {
    fn from(err: crate::security::TokenError) -> Self {
        match err {
            crate::security::TokenError::Invalid => Self::Unauthenticated,
            crate::security::TokenError::Signing(e) => Self::Internal(e.to_string()),
        }
    }
}

/// User payload safe to return to clients: no hash, no lock counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub must_change_password: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<users::Model> for UserView {
    type Error = AuthError;

    fn try_from(model: users::Model) -> Result<Self, Self::Error> {
        let role = model
            .role
            .parse::<Role>()
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(Self {
            id: UserId::new(model.id),
            name: model.name,
            email: model.email,
            mobile: model.mobile,
            role,
            is_active: model.is_active,
            must_change_password: model.must_change_password,
            last_login_at: model.last_login_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Freshly minted credentials for one session. Never persisted as-is; only
/// the refresh token's digest reaches the ledger.
#[derive(Clone)]
pub struct IssuedSession {
    pub session_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub csrf_token: String,
    pub access_max_age: chrono::Duration,
    pub refresh_max_age: chrono::Duration,
}

impl std::fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSession")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub setup_token: String,
    pub email: String,
    pub name: Option<String>,
    pub password: String,
}

/// A verified access token resolved against the credential store.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: users::Model,
    pub role: Role,
    pub payload: TokenPayload,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// True while setup has not completed and no ADMIN exists.
    async fn setup_required(&self) -> Result<bool, AuthError>;

    /// Creates the first ADMIN.
    ///
    /// # Errors
    ///
    /// [`AuthError::Forbidden`] when setup already ran or the token/email do
    /// not match, [`AuthError::WeakPassword`] on policy failure.
    async fn complete_setup(
        &self,
        request: SetupRequest,
        ctx: &RequestContext,
    ) -> Result<UserView, AuthError>;

    /// Verifies credentials, applies throttling and lockout, and opens a new session.
    async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<(UserView, IssuedSession), AuthError>;

    /// Rotates the session named by `refresh_token`.
    ///
    /// Any ledger inconsistency revokes every session of the user and
    /// returns [`AuthError::Unauthenticated`].
    async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<(UserView, IssuedSession), AuthError>;

    /// Revokes the session named by the refresh token, if it verifies.
    /// Never fails from the caller's point of view.
    async fn logout(&self, refresh_token: Option<&str>, ctx: &RequestContext);

    /// Resolves an access token to an active user with a current generation.
    async fn authenticate(&self, access_token: &str) -> Result<Authenticated, AuthError>;

    async fn current_user(&self, user_id: UserId) -> Result<UserView, AuthError>;

    /// Verifies the old password, sets the new one, revokes every session and
    /// opens a fresh one.
    async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(UserView, IssuedSession), AuthError>;

    /// Redeems a one-time reset code.
    async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError>;
}

/// Emails are compared lowercased and trimmed everywhere.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
