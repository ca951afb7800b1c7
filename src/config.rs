use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Minimum length in bytes for token signing secrets and the setup token.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub auth: AuthConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// "pretty" (human readable) or "json"
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/gatehouse.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    #[default]
    Lax,
    Strict,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on auth cookies.
    /// Default: true. Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// `SameSite` attribute for auth cookies. `none` always implies Secure.
    pub same_site: SameSitePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            secure_cookies: true,
            same_site: SameSitePolicy::Lax,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn cookies_secure(&self) -> bool {
        self.secure_cookies || self.same_site == SameSitePolicy::None
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub access_token_secret: String,

    pub refresh_token_secret: String,

    pub access_token_ttl_minutes: i64,

    pub refresh_token_ttl_days: i64,

    /// Shared secret the operator presents once to bootstrap the first admin.
    pub setup_token: String,

    /// The only email address the bootstrap admin may be created with.
    pub default_admin_email: String,

    pub password_reset_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            refresh_token_secret: String::new(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 14,
            setup_token: String::new(),
            default_admin_email: String::new(),
            password_reset_ttl_hours: 24,
        }
    }
}

// Secrets stay out of debug output and therefore out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"[REDACTED]")
            .field("refresh_token_secret", &"[REDACTED]")
            .field("access_token_ttl_minutes", &self.access_token_ttl_minutes)
            .field("refresh_token_ttl_days", &self.refresh_token_ttl_days)
            .field("setup_token", &"[REDACTED]")
            .field("default_admin_email", &self.default_admin_email)
            .field("password_reset_ttl_hours", &self.password_reset_ttl_hours)
            .finish()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn normalized_admin_email(&self) -> String {
        self.default_admin_email.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 19456 = 19MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Login throttling and lockout policy.
    pub auth_throttle: AuthThrottleConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 19 * 1024,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            auth_throttle: AuthThrottleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthThrottleConfig {
    /// Failed logins before the account is locked, and the per-email
    /// limiter threshold.
    pub max_attempts: u32,

    /// Sliding window for the in-process limiters.
    pub window_seconds: u64,

    /// Persisted account lock duration.
    pub lockout_seconds: u64,

    /// Failed logins per client IP inside the window.
    pub ip_max_attempts: u32,

    /// Trusted proxy IP addresses allowed to provide forwarded client IP headers.
    ///
    /// When empty, forwarded headers are ignored and the socket peer address
    /// is used.
    pub trusted_proxy_ips: Vec<String>,
}

impl Default for AuthThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 15 * 60,
            lockout_seconds: 15 * 60,
            ip_max_attempts: 5,
            trusted_proxy_ips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "gatehouse".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    /// Load the first config file found, then apply `.env` / environment
    /// overrides for secrets.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets: [(&str, &mut String); 4] = [
            (
                "GATEHOUSE_ACCESS_TOKEN_SECRET",
                &mut self.auth.access_token_secret,
            ),
            (
                "GATEHOUSE_REFRESH_TOKEN_SECRET",
                &mut self.auth.refresh_token_secret,
            ),
            ("GATEHOUSE_SETUP_TOKEN", &mut self.auth.setup_token),
            (
                "GATEHOUSE_DEFAULT_ADMIN_EMAIL",
                &mut self.auth.default_admin_email,
            ),
        ];

        for (key, slot) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = value;
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("gatehouse").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".gatehouse").join("config.toml"));
        }

        paths
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// Writes a default config at `path` unless one already exists.
    pub fn create_default_if_missing(path: &Path) -> Result<bool> {
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&mut self) -> Result<()> {
        let auth = &self.auth;

        for (name, secret) in [
            ("access_token_secret", &auth.access_token_secret),
            ("refresh_token_secret", &auth.refresh_token_secret),
        ] {
            if secret.is_empty() {
                anyhow::bail!("auth.{name} must be set");
            }
            if secret.len() < MIN_SECRET_LEN {
                anyhow::bail!("auth.{name} must be at least {MIN_SECRET_LEN} bytes");
            }
        }

        if auth.access_token_secret == auth.refresh_token_secret {
            anyhow::bail!("auth.access_token_secret and auth.refresh_token_secret must differ");
        }

        if !auth.setup_token.is_empty() && auth.setup_token.len() < MIN_SECRET_LEN {
            anyhow::bail!("auth.setup_token must be at least {MIN_SECRET_LEN} characters");
        }

        if auth.access_token_ttl_minutes <= 0 || auth.refresh_token_ttl_days <= 0 {
            anyhow::bail!("Token lifetimes must be positive");
        }

        if auth.password_reset_ttl_hours <= 0 {
            anyhow::bail!("auth.password_reset_ttl_hours must be positive");
        }

        if self.security.auth_throttle.max_attempts == 0 {
            anyhow::bail!("security.auth_throttle.max_attempts must be > 0");
        }

        if self.server.same_site == SameSitePolicy::None && !self.server.secure_cookies {
            warn!("server.same_site = \"none\" requires Secure cookies; forcing secure_cookies = true");
            self.server.secure_cookies = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.auth.access_token_secret = "a".repeat(40);
        config.auth.refresh_token_secret = "r".repeat(40);
        config.auth.setup_token = "s".repeat(32);
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.access_token_ttl_minutes, 15);
        assert_eq!(config.auth.refresh_token_ttl_days, 14);
        assert_eq!(config.auth.password_reset_ttl_hours, 24);
        assert_eq!(config.security.auth_throttle.max_attempts, 5);
        assert_eq!(config.security.auth_throttle.lockout_seconds, 900);
        assert_eq!(config.security.auth_throttle.window_seconds, 900);
        assert!(config.server.secure_cookies);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[auth]"));
        assert!(toml_str.contains("[security.auth_throttle]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [server]
            same_site = "strict"

            [auth]
            access_token_ttl_minutes = 5
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.same_site, SameSitePolicy::Strict);
        assert_eq!(config.auth.access_token_ttl_minutes, 5);

        assert_eq!(config.auth.refresh_token_ttl_days, 14);
    }

    #[test]
    fn test_validate_secrets() {
        assert!(valid_config().validate().is_ok());

        let mut missing = valid_config();
        missing.auth.refresh_token_secret.clear();
        assert!(missing.validate().is_err());

        let mut short = valid_config();
        short.auth.access_token_secret = "short".to_string();
        assert!(short.validate().is_err());

        let mut same = valid_config();
        same.auth.refresh_token_secret = same.auth.access_token_secret.clone();
        assert!(same.validate().is_err());

        let mut weak_setup = valid_config();
        weak_setup.auth.setup_token = "tiny".to_string();
        assert!(weak_setup.validate().is_err());
    }

    #[test]
    fn test_same_site_none_forces_secure() {
        let mut config = valid_config();
        config.server.same_site = SameSitePolicy::None;
        config.server.secure_cookies = false;
        config.validate().unwrap();
        assert!(config.server.secure_cookies);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| match key {
            "GATEHOUSE_SETUP_TOKEN" => Some("from-env".to_string()),
            "GATEHOUSE_DEFAULT_ADMIN_EMAIL" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.auth.setup_token, "from-env");
        assert!(config.auth.default_admin_email.is_empty());
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let config = valid_config();
        let rendered = format!("{:?}", config.auth);
        assert!(!rendered.contains(&config.auth.access_token_secret));
        assert!(rendered.contains("[REDACTED]"));
    }
}
