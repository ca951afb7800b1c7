//! Audit event vocabulary.
//!
//! Every privileged mutation and every authentication outcome is described by
//! an [`AuditAction`] against an [`AuditEntity`]. The string forms are what
//! lands in the `audit_logs` table and what the admin report filters on.

use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SetupComplete,
    LoginSuccess,
    LoginFail,
    Logout,
    TokenReuseDetected,
    PasswordChange,
    PasswordResetComplete,
    PasswordResetIssued,
    UserCreate,
    UserUpdate,
    UserDeactivate,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SetupComplete => "SETUP_COMPLETE",
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFail => "LOGIN_FAIL",
            Self::Logout => "LOGOUT",
            Self::TokenReuseDetected => "TOKEN_REUSE_DETECTED",
            Self::PasswordChange => "PASSWORD_CHANGE",
            Self::PasswordResetComplete => "PASSWORD_RESET_COMPLETE",
            Self::PasswordResetIssued => "PASSWORD_RESET_ISSUED",
            Self::UserCreate => "USER_CREATE",
            Self::UserUpdate => "USER_UPDATE",
            Self::UserDeactivate => "USER_DEACTIVATE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntity {
    Auth,
    User,
}

impl AuditEntity {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::User => "USER",
        }
    }
}

/// Why a login attempt was refused. Recorded in the audit `after` payload;
/// never surfaced to the caller, who always sees the same generic error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginFailReason {
    UnknownEmail,
    Locked,
    InvalidCredentials,
}

/// Why a presented refresh token failed the ledger check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReuseReason {
    /// No ledger row for this (user, session id).
    Missing,
    /// The row was already rotated or revoked.
    Revoked,
    /// The row outlived its expiry.
    Expired,
    /// The row is live but holds a different token hash.
    HashMismatch,
    /// A concurrent rotation won the compare-and-swap on this row.
    LostRace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_and_as_str_agree() {
        for action in [
            AuditAction::LoginFail,
            AuditAction::TokenReuseDetected,
            AuditAction::PasswordResetComplete,
        ] {
            assert_eq!(
                serde_json::to_string(&action).unwrap(),
                format!("\"{}\"", action.as_str())
            );
        }
        assert_eq!(
            serde_json::to_value(LoginFailReason::Locked).unwrap(),
            "LOCKED"
        );
        assert_eq!(
            serde_json::to_value(ReuseReason::HashMismatch).unwrap(),
            "HASH_MISMATCH"
        );
    }
}
