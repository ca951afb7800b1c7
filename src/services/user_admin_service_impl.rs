//! `SeaORM` implementation of the `UserAdminService` trait.

use async_trait::async_trait;
use sea_orm::{DbErr, SqlErr};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db::{NewUser, Store, UserChanges};
use crate::domain::events::{AuditAction, AuditEntity};
use crate::domain::{Principal, RequestContext, Role, UserId};
use crate::entities::users;
use crate::security::password;
use crate::security::secret::{PLACEHOLDER_PASSWORD_BYTES, random_hex};
use crate::services::audit::{AuditEntry, AuditService};
use crate::services::auth_service::{UserView, normalize_email};
use crate::services::password_reset::ResetCodeIssuer;
use crate::services::user_admin_service::{
    CreateUser, CreatedUser, IssuedReset, UserAdminError, UserAdminService,
};

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<DbErr>())
        .any(|db| matches!(db.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))))
}

fn is_active_admin(user: &users::Model) -> bool {
    user.is_active && user.role == Role::Admin.as_str()
}

pub struct SeaOrmUserAdminService {
    store: Store,
    config: Arc<Config>,
    resets: ResetCodeIssuer,
    audit: AuditService,
}

impl SeaOrmUserAdminService {
    #[must_use]
    pub const fn new(
        store: Store,
        config: Arc<Config>,
        resets: ResetCodeIssuer,
        audit: AuditService,
    ) -> Self {
        Self {
            store,
            config,
            resets,
            audit,
        }
    }

    async fn find(&self, id: UserId) -> Result<users::Model, UserAdminError> {
        self.store
            .users()
            .find_by_id(id.value())
            .await?
            .ok_or(UserAdminError::NotFound)
    }

    async fn ensure_other_active_admin(&self) -> Result<(), UserAdminError> {
        if self.store.users().count_active_admins().await? <= 1 {
            return Err(UserAdminError::LastActiveAdmin);
        }
        Ok(())
    }
}

#[async_trait]
impl UserAdminService for SeaOrmUserAdminService {
    async fn list_users(&self) -> Result<Vec<UserView>, UserAdminError> {
        let users = self.store.users().list_all().await?;
        users
            .into_iter()
            .map(|u| UserView::try_from(u).map_err(UserAdminError::from))
            .collect()
    }

    async fn create_user(
        &self,
        actor: &Principal,
        input: CreateUser,
        ctx: &RequestContext,
    ) -> Result<CreatedUser, UserAdminError> {
        let email = normalize_email(&input.email);
        if self.store.users().find_by_email(&email).await?.is_some() {
            return Err(UserAdminError::Conflict);
        }

        // Nobody learns this password; the user gets in through the reset code.
        let placeholder = random_hex(PLACEHOLDER_PASSWORD_BYTES);
        let password_hash =
            password::hash_password_blocking(&placeholder, &self.config.security).await?;

        let user = self
            .store
            .users()
            .create(NewUser {
                name: input.name,
                email,
                mobile: input.mobile.filter(|m| !m.is_empty()),
                password_hash,
                role: input.role,
                is_active: input.is_active,
                must_change_password: true,
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    UserAdminError::Conflict
                } else {
                    UserAdminError::from(e)
                }
            })?;

        let onboarding = self
            .resets
            .issue(user.id, Some(actor.user_id.value()))
            .await?;
        let view = UserView::try_from(user)?;

        info!(user_id = %view.id, role = %view.role, actor = %actor.user_id, "User created");
        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::UserCreate, AuditEntity::User)
                    .actor(actor.user_id, actor.role)
                    .entity_id(view.id)
                    .after(&view),
            )
            .await;

        Ok(CreatedUser {
            user: view,
            onboarding,
        })
    }

    async fn update_user(
        &self,
        actor: &Principal,
        id: UserId,
        changes: UserChanges,
        ctx: &RequestContext,
    ) -> Result<UserView, UserAdminError> {
        let user = self.find(id).await?;
        let before = UserView::try_from(user.clone())?;

        let next_role = changes.role.unwrap_or(before.role);
        let next_active = changes.is_active.unwrap_or(before.is_active);
        if is_active_admin(&user) && !(next_role == Role::Admin && next_active) {
            self.ensure_other_active_admin().await?;
        }

        let deactivating = changes.is_active == Some(false);
        let updated = self.store.users().apply_changes(user, changes).await?;

        if deactivating {
            self.store.sessions().revoke_all_for_user(updated.id).await?;
        }

        let view = UserView::try_from(updated)?;
        info!(user_id = %view.id, actor = %actor.user_id, "User updated");
        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::UserUpdate, AuditEntity::User)
                    .actor(actor.user_id, actor.role)
                    .entity_id(view.id)
                    .before(&before)
                    .after(&view),
            )
            .await;

        Ok(view)
    }

    async fn deactivate_user(
        &self,
        actor: &Principal,
        id: UserId,
        ctx: &RequestContext,
    ) -> Result<UserView, UserAdminError> {
        let user = self.find(id).await?;
        if is_active_admin(&user) {
            self.ensure_other_active_admin().await?;
        }

        let before = UserView::try_from(user.clone())?;
        let updated = self
            .store
            .users()
            .apply_changes(
                user,
                UserChanges {
                    is_active: Some(false),
                    ..UserChanges::default()
                },
            )
            .await?;
        let revoked = self.store.sessions().revoke_all_for_user(updated.id).await?;

        let view = UserView::try_from(updated)?;
        info!(user_id = %view.id, actor = %actor.user_id, revoked, "User deactivated");
        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::UserDeactivate, AuditEntity::User)
                    .actor(actor.user_id, actor.role)
                    .entity_id(view.id)
                    .before(&before)
                    .after(&view),
            )
            .await;

        Ok(view)
    }

    async fn issue_password_reset(
        &self,
        actor: &Principal,
        id: UserId,
        ctx: &RequestContext,
    ) -> Result<IssuedReset, UserAdminError> {
        let user = self.find(id).await?;
        if !user.is_active {
            return Err(UserAdminError::InactiveUser);
        }

        let user = self
            .store
            .users()
            .set_must_change_password(user.id, true)
            .await?;
        let reset = self
            .resets
            .issue(user.id, Some(actor.user_id.value()))
            .await?;
        let revoked = self.store.sessions().revoke_all_for_user(user.id).await?;

        let view = UserView::try_from(user)?;
        info!(user_id = %view.id, actor = %actor.user_id, revoked, "Password reset issued");
        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::PasswordResetIssued, AuditEntity::User)
                    .actor(actor.user_id, actor.role)
                    .entity_id(view.id),
            )
            .await;

        Ok(IssuedReset { user: view, reset })
    }
}
