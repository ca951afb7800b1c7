use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect,
    Set,
};

use crate::entities::{audit_logs, prelude::*};

#[derive(Debug, Clone, Default)]
pub struct NewAuditLog {
    pub actor_user_id: Option<i32>,
    pub actor_role: Option<String>,
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub ip_address: String,
    pub user_agent: String,
}

/// Append-only. There is deliberately no update or delete here.
pub struct AuditLogRepository {
    conn: DatabaseConnection,
}

impl AuditLogRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, entry: NewAuditLog) -> Result<audit_logs::Model> {
        audit_logs::ActiveModel {
            actor_user_id: Set(entry.actor_user_id),
            actor_role: Set(entry.actor_role),
            action_type: Set(entry.action_type),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            before: Set(entry.before),
            after: Set(entry.after),
            ip_address: Set(entry.ip_address),
            user_agent: Set(entry.user_agent),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert audit log")
    }

    /// Newest first. `page` is 1-based. Returns the page and the total row count.
    pub async fn list(&self, page: u64, limit: u64) -> Result<(Vec<audit_logs::Model>, u64)> {
        let total = AuditLogs::find()
            .count(&self.conn)
            .await
            .context("Failed to count audit logs")?;

        let items = AuditLogs::find()
            .order_by_desc(audit_logs::Column::CreatedAt)
            .order_by_desc(audit_logs::Column::Id)
            .offset(page.saturating_sub(1) * limit)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list audit logs")?;

        Ok((items, total))
    }
}
