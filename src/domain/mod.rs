//! Identity domain types with strong typing.
//!
//! Roles, capabilities and the authenticated [`Principal`] that every
//! protected handler receives. Collaborating subsystems (members, plans,
//! dashboards) only ever see a `Principal` and ask [`permissions::is_allowed`].

pub mod events;
pub mod permissions;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use permissions::Capability;

/// Unique identifier for a User.
///
/// Newtype wrapper that keeps user ids from being mixed with session row ids
/// or audit ids.
///
/// # Examples
///
/// ```rust
/// use gatehouse::domain::UserId;
///
/// let id = UserId::new(42);
/// assert_eq!(id.value(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UserId(i32);

impl UserId {
    /// Creates a new `UserId` from a raw database id.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        debug_assert!(id >= 0, "UserId should be non-negative");
        Self(id)
    }

    /// Returns the underlying i32 value.
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<UserId> for i32 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

impl Serialize for UserId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = i32::deserialize(deserializer)?;
        Ok(Self::new(id))
    }
}

/// Back-office role. Roles are flat: a role holds exactly the capabilities
/// the permission table lists for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Staff,
    Viewer,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Admin, Self::Staff, Self::Viewer];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Staff => "STAFF",
            Self::Viewer => "VIEWER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Self::Admin),
            "STAFF" => Ok(Self::Staff),
            "VIEWER" => Ok(Self::Viewer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// How the caller presented its access token.
///
/// Double-submit CSRF protection only applies to cookie-borne credentials;
/// a bearer header cannot be attached by a cross-site form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Cookie,
    Bearer,
}

/// The authenticated caller, attached to request extensions by the auth
/// middleware after the access token, active flag and generation all check out.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub session_id: String,
    pub generation: i32,
    pub must_change_password: bool,
    pub source: CredentialSource,
}

impl Principal {
    /// Pure capability lookup against the permission table.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        permissions::is_allowed(capability, self.role)
    }
}

/// Client metadata recorded on sessions and audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub ip_address: String,
    pub user_agent: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_conversions() {
        let id = UserId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(i32::from(id), 42);
        assert_eq!(UserId::from(42), id);
    }

    #[test]
    fn user_id_serialization() {
        let id = UserId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let deserialized: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn role_string_forms_match_storage() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(
                serde_json::to_string(&role).unwrap(),
                format!("\"{}\"", role.as_str())
            );
        }
        assert!("admin".parse::<Role>().is_err());
        assert!("OWNER".parse::<Role>().is_err());
    }

    #[test]
    fn principal_delegates_to_permission_table() {
        let principal = Principal {
            user_id: UserId::new(1),
            role: Role::Viewer,
            session_id: "s".to_string(),
            generation: 0,
            must_change_password: false,
            source: CredentialSource::Cookie,
        };
        assert!(principal.can(Capability::MembersRead));
        assert!(!principal.can(Capability::MembersWrite));
    }
}
