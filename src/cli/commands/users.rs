//! User listing and setup status command handlers

use crate::config::Config;
use crate::db::Store;

pub async fn cmd_setup_status(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let completed = store.system_state().setup_completed().await?;
    let admins = store.users().count_admins().await?;

    if !completed && admins == 0 {
        println!("Setup pending: no admin exists yet.");
        println!("Complete it with POST /api/auth/setup and the configured setup token.");
    } else {
        println!("Setup completed ({admins} admin account(s)).");
    }

    Ok(())
}

pub async fn cmd_users(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let users = store.users().list_all().await?;

    if users.is_empty() {
        println!("No users yet.");
        return Ok(());
    }

    println!("Users ({} total)", users.len());
    println!("{:-<70}", "");

    for user in users {
        let status = if !user.is_active {
            "inactive"
        } else if user.must_change_password {
            "password change pending"
        } else {
            "active"
        };

        let last_login = user
            .last_login_at
            .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());

        println!(
            "{:>4}  {:<32} {:<7} {:<24} last login: {}",
            user.id, user.email, user.role, status, last_login
        );
    }

    Ok(())
}
