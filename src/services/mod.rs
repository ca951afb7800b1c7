pub mod audit;
pub use audit::{AuditEntry, AuditPage, AuditService};

pub mod password_reset;
pub use password_reset::{IssuedResetCode, ResetCodeIssuer};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, Authenticated, IssuedSession, SetupRequest, UserView};
pub use auth_service_impl::SeaOrmAuthService;

pub mod user_admin_service;
pub mod user_admin_service_impl;
pub use user_admin_service::{
    CreateUser, CreatedUser, IssuedReset, UserAdminError, UserAdminService,
};
pub use user_admin_service_impl::SeaOrmUserAdminService;
