use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::Store;
use crate::security::secret::{RESET_CODE_BYTES, random_hex, sha256_hex};

/// A one-time code handed back to the issuer exactly once.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedResetCode {
    pub reset_code: String,
    pub reset_expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedResetCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedResetCode")
            .field("reset_code", &"[REDACTED]")
            .field("reset_expires_at", &self.reset_expires_at)
            .finish()
    }
}

#[derive(Clone)]
pub struct ResetCodeIssuer {
    store: Store,
    ttl: Duration,
}

impl ResetCodeIssuer {
    #[must_use]
    pub const fn new(store: Store, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Generates a code, stores only its digest and retires earlier unused
    /// codes for the same user.
    pub async fn issue(
        &self,
        user_id: i32,
        issued_by: Option<i32>,
    ) -> anyhow::Result<IssuedResetCode> {
        let code = random_hex(RESET_CODE_BYTES);
        let expires_at = Utc::now() + self.ttl;

        self.store
            .reset_tokens()
            .issue(user_id, &sha256_hex(&code), expires_at, issued_by)
            .await?;

        Ok(IssuedResetCode {
            reset_code: code,
            reset_expires_at: expires_at,
        })
    }
}
