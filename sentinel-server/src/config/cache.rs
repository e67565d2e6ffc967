use confique::Config;
use serde::Deserialize;

/// Specifies which cache store implementation to use
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum CacheStore {
    InMemory,
    Redis,
}

impl TryFrom<String> for CacheStore {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "in-memory" | "memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            other => Err(format!(
                "unknown cache store '{other}', expected 'in-memory' or 'redis'"
            )),
        }
    }
}

/// Configuration for the caching subsystem
#[derive(Debug, Config, Clone)]
pub struct CacheConfig {
    /// Cache store type: "in-memory" (default) or "redis"
    #[config(env = "SENTINEL_CACHE_STORE", default = "in-memory")]
    pub store: CacheStore,

    /// In-memory cache specific configuration
    #[config(nested)]
    pub memory: InMemoryConfig,

    /// Redis cache specific configuration
    #[config(nested)]
    pub redis: RedisConfig,
}

/// In-memory cache configuration options
#[derive(Debug, Config, Clone)]
pub struct InMemoryConfig {
    /// Maximum capacity in MiB (default: 128 MiB)
    #[config(env = "SENTINEL_CACHE_MEMORY_CAPACITY", default = 128)]
    pub capacity: usize,
}

/// Redis cache configuration options
#[derive(Debug, Config, Clone)]
pub struct RedisConfig {
    /// Redis connection string
    #[config(env = "SENTINEL_CACHE_REDIS_URL", default = "")]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_store_parsing() {
        assert_eq!(
            CacheStore::try_from("in-memory".to_string()),
            Ok(CacheStore::InMemory)
        );
        assert_eq!(
            CacheStore::try_from("Redis".to_string()),
            Ok(CacheStore::Redis)
        );
        assert!(CacheStore::try_from("none".to_string()).is_err());
    }
}
