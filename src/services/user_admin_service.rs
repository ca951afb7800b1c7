//! Domain service for back-office user management.

use serde::Serialize;
use thiserror::Error;

use crate::db::UserChanges;
use crate::domain::{Principal, RequestContext, Role, UserId};
use crate::services::auth_service::{AuthError, UserView};
use crate::services::password_reset::IssuedResetCode;

#[derive(Debug, Error)]
pub enum UserAdminError {
    #[error("User not found")]
    NotFound,

    #[error("User already exists")]
    Conflict,

    #[error("At least one active admin is required")]
    LastActiveAdmin,

    #[error("Cannot reset password for inactive user")]
    InactiveUser,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for UserAdminError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for UserAdminError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<AuthError> for UserAdminError {
    fn from(err: AuthError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

/// A new user together with the onboarding code the admin must hand over.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub user: UserView,
    pub onboarding: IssuedResetCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedReset {
    pub user: UserView,
    pub reset: IssuedResetCode,
}

#[async_trait::async_trait]
pub trait UserAdminService: Send + Sync {
    /// All users, newest first.
    async fn list_users(&self) -> Result<Vec<UserView>, UserAdminError>;

    /// Creates a user with an unusable password, `mustChangePassword` set and
    /// a fresh one-time reset code.
    ///
    /// # Errors
    ///
    /// Returns [`UserAdminError::Conflict`] if the email is taken.
    async fn create_user(
        &self,
        actor: &Principal,
        input: CreateUser,
        ctx: &RequestContext,
    ) -> Result<CreatedUser, UserAdminError>;

    /// Applies profile, role and active-flag changes. Refuses to leave the
    /// system without an active admin; revokes sessions on deactivation.
    async fn update_user(
        &self,
        actor: &Principal,
        id: UserId,
        changes: UserChanges,
        ctx: &RequestContext,
    ) -> Result<UserView, UserAdminError>;

    async fn deactivate_user(
        &self,
        actor: &Principal,
        id: UserId,
        ctx: &RequestContext,
    ) -> Result<UserView, UserAdminError>;

    /// Forces a password reset: sets `mustChangePassword`, revokes sessions and
    /// returns a new one-time code.
    async fn issue_password_reset(
        &self,
        actor: &Principal,
        id: UserId,
        ctx: &RequestContext,
    ) -> Result<IssuedReset, UserAdminError>;
}
