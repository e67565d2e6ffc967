use crate::config::{CacheConfig, CacheStore};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Cache trait defining the interface for all cache implementations.
///
/// Every entry carries its own TTL. Besides plain reads and writes the trait
/// exposes the single-key atomic primitives that the login flow and session
/// registry rely on: conditional writes and get-and-delete.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Store a value, replacing any previous one
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Retrieve a value from the cache
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError>;

    /// Store a value only if the key is absent. Returns whether it was written.
    async fn set_if_absent<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Replace a value only if the key is present. Returns whether it was written.
    async fn set_if_present<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Atomically remove a value and return it
    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError>;

    /// Performs a health check on the cache backend
    ///
    /// For Redis, this will ping the server.
    /// Returns Ok(()) if healthy, or Err with a descriptive message if unhealthy.
    async fn health_check(&self) -> Result<(), String>;

    /// Delete a value from the cache
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache implementation that provides a uniform interface regardless of backend.
///
/// The concrete implementation is chosen at runtime based on the application configuration.
#[derive(Clone)]
pub enum Cache {
    /// In-memory cache implementation using Moka
    InMemory(memory::InMemoryCache),
    /// Redis-based cache implementation
    Redis(redis::RedisCache),
}

#[async_trait::async_trait]
impl CacheBackend for Cache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.set(key, value, ttl).await,
            Self::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self {
            Self::InMemory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set_if_absent<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        match self {
            Self::InMemory(cache) => cache.set_if_absent(key, value, ttl).await,
            Self::Redis(cache) => cache.set_if_absent(key, value, ttl).await,
        }
    }

    async fn set_if_present<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        match self {
            Self::InMemory(cache) => cache.set_if_present(key, value, ttl).await,
            Self::Redis(cache) => cache.set_if_present(key, value, ttl).await,
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self {
            Self::InMemory(cache) => cache.take(key).await,
            Self::Redis(cache) => cache.take(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(cache) => cache.health_check().await,
            Self::Redis(cache) => cache.health_check().await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.delete(key).await,
            Self::Redis(cache) => cache.delete(key).await,
        }
    }
}

/// Creates the cache implementation selected by the configuration.
pub async fn create_cache(config: &CacheConfig) -> Result<Cache, CacheError> {
    match config.store {
        CacheStore::InMemory => {
            let cache =
                memory::InMemoryCache::new(config.memory.capacity).map_err(CacheError::Config)?;
            Ok(Cache::InMemory(cache))
        }
        CacheStore::Redis => {
            if config.redis.url.is_empty() {
                return Err(CacheError::Config(
                    "Redis URL is required for Redis cache".to_string(),
                ));
            }
            let cache = redis::RedisCache::new(&config.redis.url)
                .await
                .map_err(CacheError::Config)?;
            Ok(Cache::Redis(cache))
        }
    }
}
