use super::{CacheBackend, CacheError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct RedisCache {
    _client: Client,
    conn_manager: ConnectionManager,
}

/// Redis expiries have second granularity, anything shorter is rounded up
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

fn decode<T: DeserializeOwned>(value: Option<String>) -> Result<Option<T>, CacheError> {
    match value {
        Some(value) => serde_json::from_str(&value)
            .map_err(|e| CacheError::Deserialization(e.to_string()))
            .map(Some),
        None => Ok(None),
    }
}

impl RedisCache {
    /// Initialize a new Redis cache instance
    pub async fn new(redis_url: &str) -> Result<Self, String> {
        let client = match Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                return Err(format!("Failed to connect to Redis: {}", err));
            }
        };

        let conn_manager = match ConnectionManager::new(client.clone()).await {
            Ok(manager) => manager,
            Err(err) => {
                return Err(format!(
                    "Failed to create Redis connection manager: {}",
                    err
                ));
            }
        };

        // Test the connection to ensure it's working
        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self {
            conn_manager,
            _client: client,
        })
    }

    /// `SET key value EX ttl NX|XX`, returns whether the write happened
    async fn set_conditional<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        condition: &str,
    ) -> Result<bool, CacheError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(serialized)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .arg(condition)
            .query_async(&mut conn)
            .await
            .map_err(|err| {
                error!("Redis error while setting key {} ({}): {}", key, condition, err);
                CacheError::Redis(err.to_string())
            })?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        match conn
            .set_ex::<_, _, ()>(key, serialized, ttl_secs(ttl))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while setting key {}: {}", key, err);
                Err(CacheError::Redis(err.to_string()))
            }
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = match conn.get(key).await {
            Ok(value) => value,
            Err(err) => {
                error!("Redis error while getting key {}: {}", key, err);
                return Err(CacheError::Redis(err.to_string()));
            }
        };

        decode(result)
    }

    async fn set_if_absent<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.set_conditional(key, value, ttl, "NX").await
    }

    async fn set_if_present<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.set_conditional(key, value, ttl, "XX").await
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|err| {
                error!("Redis error while taking key {}: {}", key, err);
                CacheError::Redis(err.to_string())
            })?;

        decode(result)
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();

        match conn.del::<_, ()>(key).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while deleting key {}: {}", key, err);
                Err(CacheError::Redis(err.to_string()))
            }
        }
    }
}
