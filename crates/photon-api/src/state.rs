//! Application state management

use crate::auth::{
    AuthService, AuthSettings, InMemoryRevocationStore, InMemoryUserRepository, PasswordConfig,
    PasswordHasher, PgUserRepository, RedisRevocationStore, RevocationStore, TokenCodec,
};
use crate::mail::LogMailer;
use photon_core::{AppConfig, Mailer, UserRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Authentication service
    pub auth: AuthService,
    /// Server start time
    pub start_time: Instant,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    pub fn new(config: AppConfig, auth: AuthService) -> Self {
        Self {
            config,
            auth,
            start_time: Instant::now(),
            is_ready: AtomicBool::new(true),
        }
    }

    /// Connect the configured collaborators and build the state
    ///
    /// Without `REDIS_URL` the revocation store is in-process, and without
    /// `DATABASE_URL` users live in memory. Both are single-instance only.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        config.auth.validate()?;

        let store: Arc<dyn RevocationStore> = match &config.cache.redis_url {
            Some(url) => Arc::new(RedisRevocationStore::connect(url, config.cache.timeout()).await?),
            None => {
                tracing::warn!("REDIS_URL not set, using in-process revocation store");
                Arc::new(InMemoryRevocationStore::new(config.cache.max_capacity))
            }
        };

        let users: Arc<dyn UserRepository> = match &config.database.postgres_url {
            Some(url) => {
                let repo = PgUserRepository::connect(url, config.database.postgres_pool_size).await?;
                repo.migrate().await?;
                Arc::new(repo)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory user store");
                Arc::new(InMemoryUserRepository::new())
            }
        };

        let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(
            config.mail.from.clone(),
            config.mail.from_name.clone(),
        ));
        let hasher = PasswordHasher::new(&PasswordConfig::default())?;

        let auth = AuthService::new(
            TokenCodec::from_config(&config.auth),
            hasher,
            store,
            users,
            mailer,
            AuthSettings::from_config(&config.auth, &config.cache),
        );

        Ok(Self::new(config, auth))
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
