//! Credential primitives: token signing, password hashing and policy, opaque
//! secret handling and login throttling. Nothing here touches the database.

pub mod password;
pub mod rate_limit;
pub mod secret;
pub mod token;

pub use rate_limit::{AttemptLimiter, InMemoryLimiter, LimitDecision, LoginLimiters};
pub use token::{TokenCodec, TokenError, TokenPayload};
