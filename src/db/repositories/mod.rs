pub mod audit;
pub mod reset_token;
pub mod session;
pub mod system_state;
pub mod user;
