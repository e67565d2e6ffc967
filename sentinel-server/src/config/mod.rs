pub(crate) use crate::config::cache::{CacheConfig, CacheStore};
pub(crate) use crate::config::database::{DatabaseConfig, DatabaseStore};
pub(crate) use crate::config::oauth2::{FlowMode, OAuth2Config};
pub(crate) use crate::config::token::{SessionBackend, TokenConfig};
use confique::Config;

pub mod cache;
pub mod database;
pub mod oauth2;
pub mod token;

/// Main configuration structure for the sentinel server
#[derive(Debug, Config, Clone)]
pub struct SentinelConfig {
    /// The port the server will listen to (default: 8080)
    #[config(env = "SENTINEL_PORT", default = 8080)]
    pub port: u16,

    /// Deadline for a single request in seconds (default: 30)
    #[config(env = "SENTINEL_REQUEST_TIMEOUT", default = 30)]
    pub request_timeout: u64,

    /// Token maker and session configuration
    #[config(nested)]
    pub token: TokenConfig,

    /// Key-value cache configuration (flows and sessions)
    #[config(nested)]
    pub cache: CacheConfig,

    /// Relational store configuration
    #[config(nested)]
    pub database: DatabaseConfig,

    /// Identity provider configuration
    #[config(nested)]
    pub oauth2: OAuth2Config,
}

impl SentinelConfig {
    /// Creates a new config instance from environment variables
    pub fn new() -> Result<Self, String> {
        Self::builder().env().load().map_err(|e| e.to_string())
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(discord_mock: &wiremock::MockServer) -> Self {
        Self {
            port: 0, // Let the OS choose a port
            request_timeout: 5,
            token: TokenConfig {
                symmetric_key: "0123456789abcdef0123456789abcdef".to_string(),
                access_duration: 900,
                refresh_duration: 86400,
                session_backend: SessionBackend::Cache,
            },
            cache: CacheConfig {
                store: CacheStore::InMemory,
                memory: cache::InMemoryConfig { capacity: 16 },
                redis: cache::RedisConfig { url: String::new() },
            },
            database: DatabaseConfig {
                store: DatabaseStore::InMemory,
                url: String::new(),
                max_connections: 1,
                connect_timeout: 1,
            },
            oauth2: OAuth2Config {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
                redirect_url: "http://localhost:8080/oauth2/callback".to_string(),
                scopes: "identify email guilds".to_string(),
                authorize_url: format!("{}/oauth2/authorize", discord_mock.uri()),
                token_url: format!("{}/api/oauth2/token", discord_mock.uri()),
                api_base_url: format!("{}/api", discord_mock.uri()),
                flow_ttl: 600,
                flow_mode: FlowMode::TwoStep,
                completion_redirect: None,
                bot_permissions: 8,
            },
        }
    }
}
