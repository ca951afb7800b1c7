mod init;
mod secret;
mod users;

pub use init::cmd_init;
pub use secret::cmd_gen_secret;
pub use users::{cmd_setup_status, cmd_users};
