use crate::auth::Authenticator;
use crate::cache::{create_cache, Cache, CacheBackend, CacheError};
use crate::config::SentinelConfig;
use crate::oauth2::{DiscordClient, FlowCoordinator};
use crate::permissions::PermissionEvaluator;
use crate::session::{create_session_store, SessionError};
use crate::store::{create_store, Database, Store, StoreError};
use crate::token::{TokenError, TokenMaker};
use log::warn;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to create token maker: {0}")]
    Token(#[from] TokenError),
    #[error("Failed to create cache: {0}")]
    Cache(#[from] CacheError),
    #[error("Failed to connect to the database: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to create session store: {0}")]
    Session(#[from] SessionError),
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outcome of probing each backing service
#[derive(Debug)]
pub struct Readiness {
    pub cache: Result<(), String>,
    pub database: Result<(), String>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.cache.is_ok() && self.database.is_ok()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SentinelConfig>,
    pub cache: Arc<Cache>,
    pub store: Arc<Database>,
    pub auth: Authenticator,
    pub flows: FlowCoordinator,
    pub permissions: PermissionEvaluator,
}

impl AppState {
    fn create_discord_client(timeout: u64) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
    }

    /// Connect every backend named by `config` and wire the components together
    pub async fn new(config: SentinelConfig) -> Result<Self, StartupError> {
        let maker = TokenMaker::new(&config.token.symmetric_key)?;
        let store = create_store(&config.database).await?;
        let cache = create_cache(&config.cache).await?;
        let http = Self::create_discord_client(config.request_timeout)?;
        Self::assemble(config, maker, cache, store, http).map_err(StartupError::from)
    }

    fn assemble(
        config: SentinelConfig,
        maker: TokenMaker,
        cache: Cache,
        store: Database,
        http: Client,
    ) -> Result<Self, SessionError> {
        let sessions = create_session_store(&config.token, &cache, &store)?;
        let auth = Authenticator::new(maker, sessions, &config.token);
        let store = Arc::new(store);
        let flows = FlowCoordinator::new(
            cache.clone(),
            store.clone(),
            DiscordClient::new(http, config.oauth2.clone()),
            auth.clone(),
            &config.oauth2,
        );

        Ok(Self {
            permissions: PermissionEvaluator::new(store.clone()),
            config: Arc::new(config),
            cache: Arc::new(cache),
            store,
            auth,
            flows,
        })
    }

    /// State over in-memory backends, for tests
    #[cfg(test)]
    pub fn for_testing(config: &SentinelConfig) -> Self {
        use crate::cache::memory::InMemoryCache;
        use crate::store::memory::MemoryStore;

        let maker = TokenMaker::new(&config.token.symmetric_key).expect("Invalid test key");
        let cache = Cache::InMemory(
            InMemoryCache::new(config.cache.memory.capacity).expect("Failed to create cache"),
        );
        let store = Database::InMemory(MemoryStore::new());
        Self::assemble(config.clone(), maker, cache, store, Client::new())
            .expect("Failed to assemble test state")
    }

    /// Probe the cache and the relational store concurrently
    pub async fn health_check(&self) -> Readiness {
        let (cache, database) = tokio::join!(self.cache.health_check(), self.store.health_check());
        if let Err(e) = &cache {
            warn!("Cache is not healthy: {}", e);
        }
        if let Err(e) = &database {
            warn!("Database is not healthy: {}", e);
        }
        Readiness { cache, database }
    }
}
