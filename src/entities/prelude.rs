pub use super::audit_logs::Entity as AuditLogs;
pub use super::password_reset_tokens::Entity as PasswordResetTokens;
pub use super::system_state::Entity as SystemState;
pub use super::user_sessions::Entity as UserSessions;
pub use super::users::Entity as Users;
