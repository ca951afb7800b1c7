//! Capability table.
//!
//! Authorization is a flat lookup `(capability, role) -> allow|deny`. ADMIN is
//! listed explicitly on every row; nothing is inherited.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    SettingsManage,
    ConfigManage,
    MembersRead,
    MembersWrite,
    DashboardRead,
    UsersManage,
    AuditRead,
}

impl Capability {
    pub const ALL: [Self; 7] = [
        Self::SettingsManage,
        Self::ConfigManage,
        Self::MembersRead,
        Self::MembersWrite,
        Self::DashboardRead,
        Self::UsersManage,
        Self::AuditRead,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SettingsManage => "SETTINGS_MANAGE",
            Self::ConfigManage => "CONFIG_MANAGE",
            Self::MembersRead => "MEMBERS_READ",
            Self::MembersWrite => "MEMBERS_WRITE",
            Self::DashboardRead => "DASHBOARD_READ",
            Self::UsersManage => "USERS_MANAGE",
            Self::AuditRead => "AUDIT_READ",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PERMISSIONS: &[(Capability, &[Role])] = &[
    (Capability::SettingsManage, &[Role::Admin]),
    (Capability::ConfigManage, &[Role::Admin]),
    (
        Capability::MembersRead,
        &[Role::Admin, Role::Staff, Role::Viewer],
    ),
    (Capability::MembersWrite, &[Role::Admin, Role::Staff]),
    (
        Capability::DashboardRead,
        &[Role::Admin, Role::Staff, Role::Viewer],
    ),
    (Capability::UsersManage, &[Role::Admin]),
    (Capability::AuditRead, &[Role::Admin]),
];

/// Roles granted `capability`. Unlisted capabilities grant nobody.
#[must_use]
pub fn allowed_roles(capability: Capability) -> &'static [Role] {
    PERMISSIONS
        .iter()
        .find(|(cap, _)| *cap == capability)
        .map_or(&[], |(_, roles)| roles)
}

#[must_use]
pub fn is_allowed(capability: Capability, role: Role) -> bool {
    allowed_roles(capability).contains(&role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_capability_has_a_row() {
        for cap in Capability::ALL {
            assert!(!allowed_roles(cap).is_empty(), "{cap} has no roles");
        }
    }

    #[test]
    fn admin_is_granted_every_capability_explicitly() {
        for cap in Capability::ALL {
            assert!(is_allowed(cap, Role::Admin), "ADMIN missing {cap}");
        }
    }

    #[test]
    fn staff_and_viewer_rows() {
        assert!(is_allowed(Capability::MembersWrite, Role::Staff));
        assert!(!is_allowed(Capability::MembersWrite, Role::Viewer));
        assert!(is_allowed(Capability::MembersRead, Role::Viewer));
        assert!(is_allowed(Capability::DashboardRead, Role::Viewer));

        for cap in [
            Capability::SettingsManage,
            Capability::ConfigManage,
            Capability::UsersManage,
            Capability::AuditRead,
        ] {
            assert!(!is_allowed(cap, Role::Staff));
            assert!(!is_allowed(cap, Role::Viewer));
        }
    }
}
