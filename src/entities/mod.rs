pub mod prelude;

pub mod audit_logs;
pub mod password_reset_tokens;
pub mod system_state;
pub mod user_sessions;
pub mod users;
