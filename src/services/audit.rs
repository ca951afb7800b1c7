//! Audit recorder.
//!
//! Entries are written after the business operation has committed. A failed
//! write is logged and dropped; callers never see it.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::db::{NewAuditLog, Store};
use crate::domain::events::{AuditAction, AuditEntity};
use crate::domain::{RequestContext, Role, UserId};
use crate::entities::audit_logs;

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "newPassword",
    "oldPassword",
    "passwordHash",
    "refreshToken",
    "accessToken",
    "setupToken",
    "code",
    "resetCode",
    "tokenHash",
    "token",
    "secret",
    "cookie",
    "cookies",
];

/// Replace the value of every sensitive key, at any depth, with [`REDACTED`].
#[must_use]
pub fn redact(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    if SENSITIVE_KEYS.contains(&key.as_str()) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, redact(v))
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    actor: Option<(UserId, Role)>,
    action: AuditAction,
    entity: AuditEntity,
    entity_id: Option<String>,
    before: Option<Value>,
    after: Option<Value>,
}

impl AuditEntry {
    #[must_use]
    pub const fn new(action: AuditAction, entity: AuditEntity) -> Self {
        Self {
            actor: None,
            action,
            entity,
            entity_id: None,
            before: None,
            after: None,
        }
    }

    #[must_use]
    pub const fn actor(mut self, user_id: UserId, role: Role) -> Self {
        self.actor = Some((user_id, role));
        self
    }

    #[must_use]
    pub fn entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn before(mut self, value: &impl Serialize) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    #[must_use]
    pub fn after(mut self, value: &impl Serialize) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub items: Vec<audit_logs::Model>,
    pub pagination: Pagination,
}

#[derive(Clone)]
pub struct AuditService {
    store: Store,
}

impl AuditService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn record(&self, ctx: &RequestContext, entry: AuditEntry) {
        let action = entry.action;
        let row = NewAuditLog {
            actor_user_id: entry.actor.map(|(id, _)| id.value()),
            actor_role: entry.actor.map(|(_, role)| role.as_str().to_string()),
            action_type: action.as_str().to_string(),
            entity_type: entry.entity.as_str().to_string(),
            entity_id: entry.entity_id,
            before: entry.before.map(redact),
            after: entry.after.map(redact),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        };

        if let Err(e) = self.store.audit_logs().insert(row).await {
            warn!(action = %action, error = %e, "Audit log write failed");
        }
    }

    pub async fn list(&self, page: u64, limit: u64) -> anyhow::Result<AuditPage> {
        let (items, total_items) = self.store.audit_logs().list(page, limit).await?;
        let total_pages = total_items.div_ceil(limit.max(1)).max(1);

        Ok(AuditPage {
            items,
            pagination: Pagination {
                page,
                limit,
                total_items,
                total_pages,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_nested_and_array_values() {
        let input = json!({
            "email": "a@x.com",
            "password": "hunter2",
            "profile": {
                "refreshToken": "abc",
                "settings": [{"secret": "s"}, {"ok": 1}]
            },
            "resetCode": "123",
        });

        let output = redact(input);
        assert_eq!(output["email"], "a@x.com");
        assert_eq!(output["password"], REDACTED);
        assert_eq!(output["profile"]["refreshToken"], REDACTED);
        assert_eq!(output["profile"]["settings"][0]["secret"], REDACTED);
        assert_eq!(output["profile"]["settings"][1]["ok"], 1);
        assert_eq!(output["resetCode"], REDACTED);
    }

    #[test]
    fn redacts_whole_subtrees_under_sensitive_keys() {
        let output = redact(json!({"cookies": {"accessToken": "a", "other": "b"}}));
        assert_eq!(output["cookies"], REDACTED);
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(redact(json!(5)), json!(5));
        assert_eq!(redact(Value::Null), Value::Null);
    }
}
