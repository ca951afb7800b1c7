use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::domain::Role;
use crate::entities::{prelude::*, users};

/// Fields needed to insert a user. `email` must already be normalized.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub must_change_password: bool,
}

impl NewUser {
    pub(crate) fn into_active_model(self, now: DateTime<Utc>) -> users::ActiveModel {
        users::ActiveModel {
            name: Set(self.name),
            email: Set(self.email),
            mobile: Set(self.mobile),
            password_hash: Set(self.password_hash),
            role: Set(self.role.as_str().to_string()),
            is_active: Set(self.is_active),
            must_change_password: Set(self.must_change_password),
            failed_login_count: Set(0),
            lock_until: Set(None),
            last_login_at: Set(None),
            token_generation: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
    }
}

/// Partial profile update. `None` leaves the column untouched; `mobile:
/// Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub mobile: Option<Option<String>>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")
    }

    pub async fn create(&self, user: NewUser) -> Result<users::Model> {
        user.into_active_model(Utc::now())
            .insert(&self.conn)
            .await
            .context("Failed to insert user")
    }

    /// Newest first.
    pub async fn list_all(&self) -> Result<Vec<users::Model>> {
        Users::find()
            .order_by_desc(users::Column::CreatedAt)
            .order_by_desc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")
    }

    pub async fn count_admins(&self) -> Result<u64> {
        Users::find()
            .filter(users::Column::Role.eq(Role::Admin.as_str()))
            .count(&self.conn)
            .await
            .context("Failed to count admins")
    }

    pub async fn count_active_admins(&self) -> Result<u64> {
        Users::find()
            .filter(users::Column::Role.eq(Role::Admin.as_str()))
            .filter(users::Column::IsActive.eq(true))
            .count(&self.conn)
            .await
            .context("Failed to count active admins")
    }

    /// Bump the failure counter in place and return the stored value.
    pub async fn increment_failed_login(&self, id: i32) -> Result<i32> {
        Users::update_many()
            .col_expr(
                users::Column::FailedLoginCount,
                Expr::col(users::Column::FailedLoginCount).add(1),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to record failed login")?;

        Ok(self.require(id).await?.failed_login_count)
    }

    /// Lock the account and zero the counter, but only while the counter is
    /// still at or above `threshold`. Returns whether this call set the lock.
    pub async fn lock_after_failures(
        &self,
        id: i32,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<bool> {
        let result = Users::update_many()
            .col_expr(users::Column::FailedLoginCount, Expr::value(0))
            .col_expr(users::Column::LockUntil, Expr::value(Some(lock_until)))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::FailedLoginCount.gte(threshold))
            .exec(&self.conn)
            .await
            .context("Failed to lock account")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn record_login_success(&self, id: i32) -> Result<users::Model> {
        let now = Utc::now();
        Users::update_many()
            .col_expr(users::Column::FailedLoginCount, Expr::value(0))
            .col_expr(
                users::Column::LockUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(users::Column::LastLoginAt, Expr::value(Some(now)))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to record login")?;

        self.require(id).await
    }

    /// Replace the password hash, clear the change-required flag and bump the
    /// token generation. `clear_lockout` also resets failure tracking.
    pub async fn set_password(
        &self,
        id: i32,
        password_hash: &str,
        clear_lockout: bool,
    ) -> Result<users::Model> {
        let mut update = Users::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::MustChangePassword, Expr::value(false))
            .col_expr(
                users::Column::TokenGeneration,
                Expr::col(users::Column::TokenGeneration).add(1),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()));

        if clear_lockout {
            update = update
                .col_expr(users::Column::FailedLoginCount, Expr::value(0))
                .col_expr(
                    users::Column::LockUntil,
                    Expr::value(Option::<DateTime<Utc>>::None),
                );
        }

        update
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update password")?;

        self.require(id).await
    }

    pub async fn set_must_change_password(&self, id: i32, value: bool) -> Result<users::Model> {
        Users::update_many()
            .col_expr(users::Column::MustChangePassword, Expr::value(value))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update must_change_password")?;

        self.require(id).await
    }

    pub async fn apply_changes(&self, user: users::Model, changes: UserChanges) -> Result<users::Model> {
        let mut active: users::ActiveModel = user.into();

        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(role) = changes.role {
            active.role = Set(role.as_str().to_string());
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(mobile) = changes.mobile {
            active.mobile = Set(mobile);
        }
        active.updated_at = Set(Utc::now());

        active
            .update(&self.conn)
            .await
            .context("Failed to update user")
    }

    async fn require(&self, id: i32) -> Result<users::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))
    }
}
