use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};

use super::user::NewUser;
use crate::domain::Role;
use crate::entities::{prelude::*, system_state, users};

pub const SETUP_STATE_KEY: &str = "INITIAL_SETUP";

pub struct SystemStateRepository {
    conn: DatabaseConnection,
}

impl SystemStateRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn ensure_row<C: ConnectionTrait>(conn: &C) -> Result<()> {
        let row = system_state::ActiveModel {
            key: Set(SETUP_STATE_KEY.to_string()),
            setup_completed: Set(false),
            setup_completed_at: Set(None),
            ..Default::default()
        };

        SystemState::insert(row)
            .on_conflict(
                OnConflict::column(system_state::Column::Key)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .context("Failed to ensure setup state row")?;
        Ok(())
    }

    pub async fn setup_completed(&self) -> Result<bool> {
        Self::ensure_row(&self.conn).await?;

        let state = SystemState::find()
            .filter(system_state::Column::Key.eq(SETUP_STATE_KEY))
            .one(&self.conn)
            .await
            .context("Failed to read setup state")?;

        Ok(state.is_some_and(|s| s.setup_completed))
    }

    /// Flip the setup flag and insert the first admin atomically.
    ///
    /// Returns `None` when setup already completed or an admin exists, in
    /// which case nothing is written.
    pub async fn complete_setup(&self, admin: NewUser) -> Result<Option<users::Model>> {
        let txn = self.conn.begin().await?;
        Self::ensure_row(&txn).await?;

        let flipped = SystemState::update_many()
            .col_expr(system_state::Column::SetupCompleted, Expr::value(true))
            .col_expr(
                system_state::Column::SetupCompletedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(system_state::Column::Key.eq(SETUP_STATE_KEY))
            .filter(system_state::Column::SetupCompleted.eq(false))
            .exec(&txn)
            .await
            .context("Failed to mark setup complete")?;

        if flipped.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let admins = Users::find()
            .filter(users::Column::Role.eq(Role::Admin.as_str()))
            .count(&txn)
            .await?;
        if admins > 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let model = admin
            .into_active_model(Utc::now())
            .insert(&txn)
            .await
            .context("Failed to insert bootstrap admin")?;

        txn.commit().await?;
        Ok(Some(model))
    }
}
