use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};

use crate::entities::{password_reset_tokens, prelude::*};

pub struct ResetTokenRepository {
    conn: DatabaseConnection,
}

impl ResetTokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Store a new code hash and mark every earlier unused code for the user
    /// as used, in one transaction.
    pub async fn issue(
        &self,
        user_id: i32,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        created_by_user_id: Option<i32>,
    ) -> Result<password_reset_tokens::Model> {
        let now = Utc::now();
        let txn = self.conn.begin().await?;

        PasswordResetTokens::update_many()
            .col_expr(
                password_reset_tokens::Column::UsedAt,
                Expr::value(Some(now)),
            )
            .filter(password_reset_tokens::Column::UserId.eq(user_id))
            .filter(password_reset_tokens::Column::UsedAt.is_null())
            .exec(&txn)
            .await
            .context("Failed to invalidate previous reset codes")?;

        let model = password_reset_tokens::ActiveModel {
            user_id: Set(user_id),
            token_hash: Set(token_hash.to_string()),
            expires_at: Set(expires_at),
            used_at: Set(None),
            created_by_user_id: Set(created_by_user_id),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert reset code")?;

        txn.commit().await?;
        Ok(model)
    }

    /// Unused code matching `(user_id, token_hash)`. Expiry is left to the caller.
    pub async fn find_unused(
        &self,
        user_id: i32,
        token_hash: &str,
    ) -> Result<Option<password_reset_tokens::Model>> {
        PasswordResetTokens::find()
            .filter(password_reset_tokens::Column::UserId.eq(user_id))
            .filter(password_reset_tokens::Column::TokenHash.eq(token_hash))
            .filter(password_reset_tokens::Column::UsedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query reset code")
    }

    /// Compare-and-swap on `used_at`. `false` means someone else consumed it.
    pub async fn consume(&self, id: i32) -> Result<bool> {
        let result = PasswordResetTokens::update_many()
            .col_expr(
                password_reset_tokens::Column::UsedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(password_reset_tokens::Column::Id.eq(id))
            .filter(password_reset_tokens::Column::UsedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to consume reset code")?;

        Ok(result.rows_affected == 1)
    }

    /// Oldest first.
    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<password_reset_tokens::Model>> {
        PasswordResetTokens::find()
            .filter(password_reset_tokens::Column::UserId.eq(user_id))
            .order_by_asc(password_reset_tokens::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list reset codes")
    }
}
