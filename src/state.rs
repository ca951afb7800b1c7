use chrono::Duration;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::security::{LoginLimiters, TokenCodec};
use crate::services::{
    AuditService, AuthService, ResetCodeIssuer, SeaOrmAuthService, SeaOrmUserAdminService,
    UserAdminService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    /// Owned here so operators and tests can reset throttling state.
    pub limiters: LoginLimiters,

    pub audit: AuditService,

    pub auth_service: Arc<dyn AuthService>,

    pub user_admin_service: Arc<dyn UserAdminService>,
}

impl SharedState {
    /// Validates the config, opens the store and wires the services together.
    pub async fn new(mut config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let limiters = LoginLimiters::in_memory(&config.security.auth_throttle);
        Ok(Self::with_parts(config, store, limiters))
    }

    /// Wires services over an existing store and limiter pair.
    #[must_use]
    pub fn with_parts(config: Config, store: Store, limiters: LoginLimiters) -> Self {
        let codec = Arc::new(TokenCodec::from_config(&config.auth));
        let reset_ttl = Duration::hours(config.auth.password_reset_ttl_hours);
        let config = Arc::new(config);

        let audit = AuditService::new(store.clone());
        let resets = ResetCodeIssuer::new(store.clone(), reset_ttl);

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.clone(),
            codec,
            limiters.clone(),
            audit.clone(),
        )) as Arc<dyn AuthService>;

        let user_admin_service = Arc::new(SeaOrmUserAdminService::new(
            store.clone(),
            config.clone(),
            resets,
            audit.clone(),
        )) as Arc<dyn UserAdminService>;

        Self {
            config,
            store,
            limiters,
            audit,
            auth_service,
            user_admin_service,
        }
    }
}
