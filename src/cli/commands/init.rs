//! Config initialisation command handler

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::security::secret::random_hex;

const GENERATED_SECRET_BYTES: usize = 32;

pub fn cmd_init(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(Config::default_config_path);

    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    let config = generated_config();
    config.save_to_path(&path)?;

    print_next_steps(&path, &config);
    Ok(())
}

fn generated_config() -> Config {
    let mut config = Config::default();
    config.auth.access_token_secret = random_hex(GENERATED_SECRET_BYTES);
    config.auth.refresh_token_secret = random_hex(GENERATED_SECRET_BYTES);
    config.auth.setup_token = random_hex(GENERATED_SECRET_BYTES);
    config
}

fn print_next_steps(path: &Path, config: &Config) {
    println!("✓ Config file created at {}", path.display());
    println!();
    println!("Setup token (needed once for POST /api/auth/setup):");
    println!("  {}", config.auth.setup_token);
    println!();
    println!("Before starting, set auth.default_admin_email in the config");
    println!("or GATEHOUSE_DEFAULT_ADMIN_EMAIL in the environment.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_validates() {
        let mut config = generated_config();
        config.auth.default_admin_email = "owner@example.com".to_string();
        assert!(config.validate().is_ok());
        assert_ne!(
            config.auth.access_token_secret,
            config.auth.refresh_token_secret
        );
    }
}
