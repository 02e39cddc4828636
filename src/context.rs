/// Application context and dependency injection
use crate::{
    auth::SessionKeys,
    config::{ServerConfig, StoreConfig},
    error::AppResult,
    mailer::Mailer,
    media::MediaLibrary,
    rate_limit::{RateLimitConfig, RateLimiter},
    repository::Repository,
    store::{self, ObjectStore},
    verification::{CodeCache, MemoryCodeCache, RedisCodeCache, VerificationStore},
};
use std::sync::Arc;
use std::time::Instant;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn ObjectStore>,
    pub repository: Arc<Repository>,
    pub media: Arc<MediaLibrary>,
    pub verification: Arc<VerificationStore>,
    pub sessions: Arc<SessionKeys>,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
    // Email mailer
    pub mailer: Arc<Mailer>,
    pub started_at: Instant,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        // Initialize object store
        let store = store::open(&config.storage.store).await?;

        // Initialize verification code cache
        let cache: Arc<dyn CodeCache> = match &config.verification.redis_url {
            Some(url) => Arc::new(RedisCodeCache::connect(url).await?),
            None => {
                tracing::info!("Verification codes held in process memory");
                Arc::new(MemoryCodeCache::new())
            }
        };

        Self::with_parts(config, store, cache)
    }

    /// Assemble a context around an existing store and code cache
    pub fn with_parts(
        config: ServerConfig,
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn CodeCache>,
    ) -> AppResult<Self> {
        let repository = Arc::new(Repository::new(Arc::clone(&store)));
        let media = Arc::new(MediaLibrary::new(
            Arc::clone(&store),
            &config.service.public_url,
            config.service.upload_limit,
        ));
        let verification = Arc::new(VerificationStore::new(
            cache,
            config.verification.code_ttl,
        ));
        let sessions = Arc::new(SessionKeys::new(
            &config.authentication.jwt_secret,
            config.authentication.token_ttl,
        ));

        // Initialize rate limiter
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::from_global(
            config.rate_limit.global_requests_per_minute,
        )));

        // Initialize mailer
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            config: Arc::new(config),
            store,
            repository,
            media,
            verification,
            sessions,
            rate_limiter,
            mailer,
            started_at: Instant::now(),
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        match &config.storage.store {
            StoreConfig::Disk {
                location,
                tmp_location,
            } => {
                tokio::fs::create_dir_all(location).await?;
                tokio::fs::create_dir_all(tmp_location).await?;
            }
            StoreConfig::Sqlite { path } => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            StoreConfig::Memory | StoreConfig::Remote { .. } => {}
        }

        Ok(())
    }

    /// Listen address
    pub fn bind_address(&self) -> String {
        format!(
            "{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
