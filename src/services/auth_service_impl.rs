//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{NewSession, NewUser, Store};
use crate::domain::events::{AuditAction, AuditEntity, LoginFailReason, ReuseReason};
use crate::domain::{RequestContext, Role, UserId};
use crate::entities::{user_sessions, users};
use crate::security::secret::{CSRF_TOKEN_BYTES, constant_time_eq, new_session_id, random_hex, sha256_hex};
use crate::security::{LimitDecision, LoginLimiters, TokenCodec, TokenPayload, password};
use crate::services::audit::{AuditEntry, AuditService};
use crate::services::auth_service::{
    AuthError, AuthService, Authenticated, IssuedSession, SetupRequest, UserView,
    normalize_email,
};

const DEFAULT_ADMIN_NAME: &str = "Business Owner";

/// Outcome of checking a presented refresh token against the ledger.
#[derive(Debug)]
pub enum LedgerVerdict {
    /// The row is live and holds this token's digest.
    Current(user_sessions::Model),
    /// Anything else. Always handled by revoking every session of the user.
    Reuse(ReuseReason),
}

/// Pure classification of a ledger lookup.
#[must_use]
pub fn classify_session(
    row: Option<user_sessions::Model>,
    presented_hash: &str,
    now: DateTime<Utc>,
) -> LedgerVerdict {
    let Some(row) = row else {
        return LedgerVerdict::Reuse(ReuseReason::Missing);
    };
    if row.revoked_at.is_some() {
        return LedgerVerdict::Reuse(ReuseReason::Revoked);
    }
    if row.expires_at <= now {
        return LedgerVerdict::Reuse(ReuseReason::Expired);
    }
    if !constant_time_eq(&row.refresh_token_hash, presented_hash) {
        return LedgerVerdict::Reuse(ReuseReason::HashMismatch);
    }
    LedgerVerdict::Current(row)
}

fn role_of(user: &users::Model) -> Result<Role, AuthError> {
    user.role
        .parse::<Role>()
        .map_err(|e| AuthError::Internal(e.to_string()))
}

pub struct SeaOrmAuthService {
    store: Store,
    config: Arc<Config>,
    codec: Arc<TokenCodec>,
    limiters: LoginLimiters,
    audit: AuditService,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(
        store: Store,
        config: Arc<Config>,
        codec: Arc<TokenCodec>,
        limiters: LoginLimiters,
        audit: AuditService,
    ) -> Self {
        Self {
            store,
            config,
            codec,
            limiters,
            audit,
        }
    }

    /// Per-email failures are only checked here; every attempt counts
    /// against the client IP.
    fn check_limits(&self, email: &str, ctx: &RequestContext) -> Result<(), AuthError> {
        let decisions = [
            ("email", self.limiters.by_email.check(email)),
            ("ip", self.limiters.by_ip.hit(&ctx.ip_address)),
        ];

        for (scope, decision) in decisions {
            if let LimitDecision::Limited { retry_after } = decision {
                metrics::counter!("auth_login_total", "outcome" => "throttled").increment(1);
                warn!(scope, "Login throttled");
                return Err(AuthError::TooManyAttempts {
                    retry_after_secs: retry_after.as_secs().max(1),
                });
            }
        }
        Ok(())
    }

    async fn fail_login(
        &self,
        email: &str,
        ctx: &RequestContext,
        user: Option<(&users::Model, Role)>,
        reason: LoginFailReason,
    ) {
        self.limiters.by_email.register_failure(email);

        metrics::counter!("auth_login_total", "outcome" => "failure").increment(1);
        warn!(
            user_id = user.map(|(u, _)| u.id),
            reason = ?reason,
            "Login failed"
        );

        let entry = AuditEntry::new(AuditAction::LoginFail, AuditEntity::Auth);
        let entry = match user {
            Some((user, role)) => entry
                .actor(UserId::new(user.id), role)
                .entity_id(user.id)
                .after(&json!({ "reason": reason })),
            None => entry.after(&json!({ "email": email, "reason": reason })),
        };
        self.audit.record(ctx, entry).await;
    }

    /// Mint a new token pair for `user` and persist its ledger row.
    async fn open_session(
        &self,
        user: &users::Model,
        role: Role,
        ctx: &RequestContext,
    ) -> Result<IssuedSession, AuthError> {
        let payload = TokenPayload {
            user_id: UserId::new(user.id),
            role,
            session_id: new_session_id(),
            generation: user.token_generation,
        };

        let access_token = self.codec.issue_access(&payload)?;
        let refresh_token = self.codec.issue_refresh(&payload)?;

        self.store
            .sessions()
            .create(NewSession {
                user_id: user.id,
                session_id: payload.session_id.clone(),
                refresh_token_hash: sha256_hex(&refresh_token),
                expires_at: Utc::now() + self.codec.refresh_ttl(),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
            })
            .await?;

        Ok(IssuedSession {
            session_id: payload.session_id,
            access_token,
            refresh_token,
            csrf_token: random_hex(CSRF_TOKEN_BYTES),
            access_max_age: self.codec.access_ttl(),
            refresh_max_age: self.codec.refresh_ttl(),
        })
    }

    /// Theft containment: every session of the user dies.
    async fn contain_reuse(
        &self,
        user: &users::Model,
        role: Role,
        reason: ReuseReason,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let revoked = self.store.sessions().revoke_all_for_user(user.id).await?;

        metrics::counter!("auth_token_reuse_total").increment(1);
        if reason == ReuseReason::Expired {
            warn!(
                event = "token_reuse_detected",
                user_id = user.id,
                reason = ?reason,
                revoked,
                "Expired refresh session presented"
            );
        } else {
            error!(
                event = "token_reuse_detected",
                user_id = user.id,
                reason = ?reason,
                revoked,
                "Refresh token reuse detected, all sessions revoked"
            );
        }

        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::TokenReuseDetected, AuditEntity::Auth)
                    .actor(UserId::new(user.id), role)
                    .entity_id(user.id)
                    .after(&json!({ "reason": reason, "revokedSessions": revoked })),
            )
            .await;
        Ok(())
    }

    async fn load_current(&self, payload: &TokenPayload) -> Result<users::Model, AuthError> {
        self.store
            .users()
            .find_by_id(payload.user_id.value())
            .await?
            .filter(|u| u.is_active && u.token_generation == payload.generation)
            .ok_or(AuthError::Unauthenticated)
    }

    fn enforce_strength(password: &str) -> Result<(), AuthError> {
        match password::check_strength(password) {
            Some(message) => Err(AuthError::WeakPassword(message.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn setup_required(&self) -> Result<bool, AuthError> {
        if self.store.system_state().setup_completed().await? {
            return Ok(false);
        }
        Ok(self.store.users().count_admins().await? == 0)
    }

    async fn complete_setup(
        &self,
        request: SetupRequest,
        ctx: &RequestContext,
    ) -> Result<UserView, AuthError> {
        if !self.setup_required().await? {
            return Err(AuthError::Forbidden("Setup already completed".to_string()));
        }

        let invalid = || AuthError::Forbidden("Invalid setup credentials".to_string());

        if !constant_time_eq(&self.config.auth.setup_token, &request.setup_token) {
            warn!("Setup attempted with an invalid token");
            return Err(invalid());
        }

        let expected_email = self.config.auth.normalized_admin_email();
        if expected_email.is_empty() || normalize_email(&request.email) != expected_email {
            warn!("Setup attempted with a non-default admin email");
            return Err(invalid());
        }

        Self::enforce_strength(&request.password)?;

        let password_hash =
            password::hash_password_blocking(&request.password, &self.config.security).await?;

        let admin = NewUser {
            name: request
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string()),
            email: expected_email,
            mobile: None,
            password_hash,
            role: Role::Admin,
            is_active: true,
            must_change_password: false,
        };

        let Some(admin) = self.store.system_state().complete_setup(admin).await? else {
            return Err(AuthError::Forbidden("Setup already completed".to_string()));
        };
        let view = UserView::try_from(admin)?;

        info!(user_id = %view.id, "Initial setup completed");
        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::SetupComplete, AuditEntity::Auth)
                    .actor(view.id, Role::Admin)
                    .entity_id(view.id)
                    .after(&view),
            )
            .await;

        Ok(view)
    }

    async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<(UserView, IssuedSession), AuthError> {
        let email = normalize_email(email);
        self.check_limits(&email, ctx)?;

        let security = &self.config.security;

        let Some(user) = self.store.users().find_by_email(&email).await? else {
            password::equalize_timing(password, security).await;
            self.fail_login(&email, ctx, None, LoginFailReason::UnknownEmail)
                .await;
            return Err(AuthError::InvalidCredentials);
        };
        let role = role_of(&user)?;

        let now = Utc::now();
        if user.lock_until.is_some_and(|until| until > now) {
            password::equalize_timing(password, security).await;
            self.fail_login(&email, ctx, Some((&user, role)), LoginFailReason::Locked)
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        let password_ok = password::verify_password_blocking(password, &user.password_hash)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id = user.id, error = %e, "Stored password hash could not be verified");
                false
            });

        if !password_ok || !user.is_active {
            let throttle = &security.auth_throttle;
            let max_attempts = i32::try_from(throttle.max_attempts).unwrap_or(i32::MAX);

            let failed = self.store.users().increment_failed_login(user.id).await?;
            if failed >= max_attempts {
                let lockout = i64::try_from(throttle.lockout_seconds).unwrap_or(i64::MAX);
                let locked = self
                    .store
                    .users()
                    .lock_after_failures(user.id, max_attempts, now + Duration::seconds(lockout))
                    .await?;
                if locked {
                    warn!(user_id = user.id, "Account locked after repeated failures");
                }
            }

            self.fail_login(
                &email,
                ctx,
                Some((&user, role)),
                LoginFailReason::InvalidCredentials,
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        let user = self.store.users().record_login_success(user.id).await?;
        self.limiters.by_email.register_success(&email);

        let session = self.open_session(&user, role, ctx).await?;

        metrics::counter!("auth_login_total", "outcome" => "success").increment(1);
        info!(user_id = user.id, "Login succeeded");
        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::LoginSuccess, AuditEntity::Auth)
                    .actor(UserId::new(user.id), role)
                    .entity_id(user.id),
            )
            .await;

        Ok((UserView::try_from(user)?, session))
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<(UserView, IssuedSession), AuthError> {
        let payload = self.codec.verify_refresh(refresh_token)?;
        let user = self.load_current(&payload).await?;
        let role = role_of(&user)?;

        let row = self
            .store
            .sessions()
            .find_for_user(user.id, &payload.session_id)
            .await?;

        let row = match classify_session(row, &sha256_hex(refresh_token), Utc::now()) {
            LedgerVerdict::Current(row) => row,
            LedgerVerdict::Reuse(reason) => {
                self.contain_reuse(&user, role, reason, ctx).await?;
                return Err(AuthError::Unauthenticated);
            }
        };

        // The successor row exists before the swap, so a racer that loses the
        // swap and contains the user always revokes it too.
        let session = self.open_session(&user, role, ctx).await?;

        if !self.store.sessions().mark_rotated(row.id).await? {
            self.contain_reuse(&user, role, ReuseReason::LostRace, ctx)
                .await?;
            return Err(AuthError::Unauthenticated);
        }
        debug!(user_id = user.id, "Session rotated");

        Ok((UserView::try_from(user)?, session))
    }

    async fn logout(&self, refresh_token: Option<&str>, ctx: &RequestContext) {
        let Some(token) = refresh_token else {
            return;
        };
        let Ok(payload) = self.codec.verify_refresh(token) else {
            debug!("Logout with unverifiable refresh token");
            return;
        };

        if let Err(e) = self
            .store
            .sessions()
            .revoke_session(payload.user_id.value(), &payload.session_id)
            .await
        {
            warn!(user_id = %payload.user_id, error = %e, "Failed to revoke session on logout");
        }

        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::Logout, AuditEntity::Auth)
                    .actor(payload.user_id, payload.role)
                    .entity_id(payload.user_id),
            )
            .await;
    }

    async fn authenticate(&self, access_token: &str) -> Result<Authenticated, AuthError> {
        let payload = self.codec.verify_access(access_token)?;
        let user = self.load_current(&payload).await?;
        let role = role_of(&user)?;

        Ok(Authenticated {
            user,
            role,
            payload,
        })
    }

    async fn current_user(&self, user_id: UserId) -> Result<UserView, AuthError> {
        let user = self
            .store
            .users()
            .find_by_id(user_id.value())
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::Unauthenticated)?;

        UserView::try_from(user)
    }

    async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(UserView, IssuedSession), AuthError> {
        let user = self
            .store
            .users()
            .find_by_id(user_id.value())
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::Unauthenticated)?;
        let role = role_of(&user)?;

        if !password::verify_password_blocking(old_password, &user.password_hash).await? {
            return Err(AuthError::IncorrectPassword);
        }
        Self::enforce_strength(new_password)?;

        let password_hash =
            password::hash_password_blocking(new_password, &self.config.security).await?;
        let user = self
            .store
            .users()
            .set_password(user.id, &password_hash, false)
            .await?;
        self.store.sessions().revoke_all_for_user(user.id).await?;

        let session = self.open_session(&user, role, ctx).await?;

        info!(user_id = user.id, "Password changed");
        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::PasswordChange, AuditEntity::Auth)
                    .actor(user_id, role)
                    .entity_id(user_id),
            )
            .await;

        Ok((UserView::try_from(user)?, session))
    }

    async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let user = self
            .store
            .users()
            .find_by_email(&email)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InvalidResetCode)?;
        let role = role_of(&user)?;

        let record = self
            .store
            .reset_tokens()
            .find_unused(user.id, &sha256_hex(code))
            .await?
            .filter(|r| r.expires_at > Utc::now())
            .ok_or(AuthError::InvalidResetCode)?;

        Self::enforce_strength(new_password)?;

        let password_hash =
            password::hash_password_blocking(new_password, &self.config.security).await?;

        if !self.store.reset_tokens().consume(record.id).await? {
            return Err(AuthError::InvalidResetCode);
        }

        self.store
            .users()
            .set_password(user.id, &password_hash, true)
            .await?;
        let revoked = self.store.sessions().revoke_all_for_user(user.id).await?;

        info!(user_id = user.id, revoked, "Password reset completed");
        self.audit
            .record(
                ctx,
                AuditEntry::new(AuditAction::PasswordResetComplete, AuditEntity::Auth)
                    .actor(UserId::new(user.id), role)
                    .entity_id(user.id),
            )
            .await;

        Ok(())
    }
}
