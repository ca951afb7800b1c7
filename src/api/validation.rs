//! Request shape checks. Policy decisions (password strength, setup
//! credentials) stay in the services.

use regex::Regex;
use std::sync::OnceLock;

use super::types::{
    AuditLogQuery, ChangePasswordRequest, CreateUserRequest, LoginRequest, ResetPasswordRequest,
    SetupBody, UpdateUserRequest,
};
use super::{ApiError, FieldErrors};
use crate::db::UserChanges;
use crate::domain::{Role, UserId};
use crate::services::{CreateUser, SetupRequest};

pub const MAX_NAME_LENGTH: usize = 120;
pub const MIN_RESET_CODE_LENGTH: usize = 20;
pub const MIN_SETUP_TOKEN_LENGTH: usize = 32;
pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex pattern defined in code")
    })
}

#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

/// Collects field failures and turns them into a single 400.
#[derive(Default)]
struct Checker {
    errors: FieldErrors,
}

impl Checker {
    fn fail(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    fn email(&mut self, field: &str, value: &str) {
        if !is_valid_email(value) {
            self.fail(field, "Invalid email");
        }
    }

    fn required(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.fail(field, "Required");
        }
    }

    fn name(&mut self, field: &str, value: &str) {
        let len = value.trim().chars().count();
        if len == 0 {
            self.fail(field, "Required");
        } else if len > MAX_NAME_LENGTH {
            self.fail(field, "Must be at most 120 characters");
        }
    }

    fn role(&mut self, field: &str, value: &str) -> Option<Role> {
        value.parse::<Role>().map_or_else(
            |_| {
                self.fail(field, "Must be one of ADMIN, STAFF, VIEWER");
                None
            },
            Some,
        )
    }

    fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(self.errors))
        }
    }
}

pub fn validate_login(body: &LoginRequest) -> Result<(), ApiError> {
    let mut check = Checker::default();
    check.email("email", &body.email);
    check.required("password", &body.password);
    check.finish()
}

pub fn validate_setup(body: SetupBody) -> Result<SetupRequest, ApiError> {
    let mut check = Checker::default();
    if body.setup_token.chars().count() < MIN_SETUP_TOKEN_LENGTH {
        check.fail("setupToken", "Must be at least 32 characters");
    }
    check.email("email", &body.email);
    if let Some(name) = &body.name {
        check.name("name", name);
    }
    check.required("password", &body.password);
    check.finish()?;

    Ok(SetupRequest {
        setup_token: body.setup_token,
        email: body.email,
        name: body.name.map(|n| n.trim().to_string()),
        password: body.password,
    })
}

pub fn validate_change_password(body: &ChangePasswordRequest) -> Result<(), ApiError> {
    let mut check = Checker::default();
    check.required("oldPassword", &body.old_password);
    check.required("newPassword", &body.new_password);
    check.finish()
}

pub fn validate_reset_password(body: &ResetPasswordRequest) -> Result<(), ApiError> {
    let mut check = Checker::default();
    check.email("email", &body.email);
    if body.code.chars().count() < MIN_RESET_CODE_LENGTH {
        check.fail("code", "Must be at least 20 characters");
    }
    check.required("newPassword", &body.new_password);
    check.finish()
}

pub fn validate_create_user(body: CreateUserRequest) -> Result<CreateUser, ApiError> {
    let mut check = Checker::default();
    check.name("name", &body.name);
    check.email("email", &body.email);
    let role = check.role("role", &body.role);
    check.finish()?;

    let role = role.ok_or_else(|| ApiError::internal("role missing after validation"))?;
    Ok(CreateUser {
        name: body.name.trim().to_string(),
        email: body.email,
        mobile: body.mobile.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
        role,
        is_active: body.is_active.unwrap_or(true),
    })
}

pub fn validate_update_user(body: UpdateUserRequest) -> Result<UserChanges, ApiError> {
    let mut check = Checker::default();
    if let Some(name) = &body.name {
        check.name("name", name);
    }
    let role = body.role.as_deref().and_then(|r| check.role("role", r));
    check.finish()?;

    Ok(UserChanges {
        name: body.name.map(|n| n.trim().to_string()),
        role,
        is_active: body.is_active,
        mobile: body.mobile.map(|m| {
            let m = m.trim().to_string();
            (!m.is_empty()).then_some(m)
        }),
    })
}

/// Path ids that are not positive integers name no user.
pub fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .map(UserId::new)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Returns `(page, limit)`. Anything out of range is a 422.
pub fn parse_pagination(query: &AuditLogQuery) -> Result<(u64, u64), ApiError> {
    fn field(raw: Option<&str>, default: u64) -> Option<u64> {
        raw.map_or(Some(default), |v| v.trim().parse::<u64>().ok())
    }

    let page = field(query.page.as_deref(), 1).filter(|p| *p >= 1);
    let limit = field(query.limit.as_deref(), DEFAULT_PAGE_LIMIT)
        .filter(|l| (1..=MAX_PAGE_LIMIT).contains(l));

    match (page, limit) {
        (Some(page), Some(limit)) => Ok((page, limit)),
        _ => {
            let mut errors = FieldErrors::new();
            errors.insert("query".to_string(), "Invalid pagination params".to_string());
            Err(ApiError::Unprocessable {
                message: "Validation error".to_string(),
                errors,
            })
        }
    }
}
