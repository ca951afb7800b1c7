use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::{prelude::*, user_sessions};

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i32,
    pub session_id: String,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
}

/// Refresh-token ledger.
pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, session: NewSession) -> Result<user_sessions::Model> {
        let now = Utc::now();
        user_sessions::ActiveModel {
            user_id: Set(session.user_id),
            session_id: Set(session.session_id),
            refresh_token_hash: Set(session.refresh_token_hash),
            created_at: Set(now),
            expires_at: Set(session.expires_at),
            revoked_at: Set(None),
            last_used_at: Set(Some(now)),
            ip_address: Set(session.ip_address),
            user_agent: Set(session.user_agent),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert session")
    }

    pub async fn find_for_user(
        &self,
        user_id: i32,
        session_id: &str,
    ) -> Result<Option<user_sessions::Model>> {
        UserSessions::find()
            .filter(user_sessions::Column::UserId.eq(user_id))
            .filter(user_sessions::Column::SessionId.eq(session_id))
            .one(&self.conn)
            .await
            .context("Failed to query session")
    }

    /// Compare-and-swap from live to rotated. Returns `false` when another
    /// caller already revoked the row, which the caller must treat as reuse.
    pub async fn mark_rotated(&self, id: i32) -> Result<bool> {
        let now = Utc::now();
        let result = UserSessions::update_many()
            .col_expr(user_sessions::Column::RevokedAt, Expr::value(Some(now)))
            .col_expr(user_sessions::Column::LastUsedAt, Expr::value(Some(now)))
            .filter(user_sessions::Column::Id.eq(id))
            .filter(user_sessions::Column::RevokedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to rotate session")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn revoke_session(&self, user_id: i32, session_id: &str) -> Result<u64> {
        let now = Utc::now();
        let result = UserSessions::update_many()
            .col_expr(user_sessions::Column::RevokedAt, Expr::value(Some(now)))
            .col_expr(user_sessions::Column::LastUsedAt, Expr::value(Some(now)))
            .filter(user_sessions::Column::UserId.eq(user_id))
            .filter(user_sessions::Column::SessionId.eq(session_id))
            .filter(user_sessions::Column::RevokedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to revoke session")?;

        Ok(result.rows_affected)
    }

    pub async fn revoke_all_for_user(&self, user_id: i32) -> Result<u64> {
        let result = UserSessions::update_many()
            .col_expr(
                user_sessions::Column::RevokedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(user_sessions::Column::UserId.eq(user_id))
            .filter(user_sessions::Column::RevokedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to revoke user sessions")?;

        Ok(result.rows_affected)
    }

    /// Sessions that are neither revoked nor expired.
    pub async fn count_active_for_user(&self, user_id: i32) -> Result<u64> {
        UserSessions::find()
            .filter(user_sessions::Column::UserId.eq(user_id))
            .filter(user_sessions::Column::RevokedAt.is_null())
            .filter(user_sessions::Column::ExpiresAt.gt(Utc::now()))
            .count(&self.conn)
            .await
            .context("Failed to count active sessions")
    }

    /// Oldest first.
    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<user_sessions::Model>> {
        UserSessions::find()
            .filter(user_sessions::Column::UserId.eq(user_id))
            .order_by_asc(user_sessions::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list sessions")
    }
}
