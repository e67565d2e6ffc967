use super::{CacheBackend, CacheError};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::ops::compute::{CompResult, Op};
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

/// Serialized value plus the TTL it was written with
#[derive(Clone, Debug)]
struct CacheEntry {
    data: String,
    ttl: Duration,
    expires_at: Instant,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self, CacheError> {
        Ok(Self {
            data: serde_json::to_string(value)?,
            ttl,
            expires_at: Instant::now() + ttl,
        })
    }

    /// Moka evicts lazily, so reads re-check the deadline
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        serde_json::from_str(&self.data).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct InMemoryCache {
    cache: MokaCache<String, CacheEntry>,
}

impl InMemoryCache {
    /// Initialize a new in-memory cache instance
    pub fn new(capacity_mib: usize) -> Result<Self, String> {
        // Convert MiB to bytes for max_capacity (1 MiB = 1024 * 1024 bytes)
        let max_capacity_bytes: u64 = capacity_mib
            .checked_mul(1024 * 1024)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| format!("Cache capacity of {capacity_mib} MiB overflows"))?;

        let cache = MokaCache::builder()
            .expire_after(EntryExpiry)
            .weigher(|key: &String, value: &CacheEntry| -> u32 {
                (key.len() + value.data.len())
                    .try_into()
                    .unwrap_or(u32::MAX)
            })
            .max_capacity(max_capacity_bytes)
            .build();

        Ok(Self { cache })
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_live() => entry.decode().map(Some),
            _ => Ok(None),
        }
    }

    async fn set_if_absent<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let entry = CacheEntry::new(value, ttl)?;
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(move |current| {
                let op = match current {
                    Some(existing) if existing.value().is_live() => Op::Nop,
                    _ => Op::Put(entry),
                };
                std::future::ready(op)
            })
            .await;
        Ok(matches!(
            result,
            CompResult::Inserted(_) | CompResult::ReplacedWith(_)
        ))
    }

    async fn set_if_present<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let entry = CacheEntry::new(value, ttl)?;
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(move |current| {
                let op = match current {
                    Some(existing) if existing.value().is_live() => Op::Put(entry),
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        Ok(matches!(result, CompResult::ReplacedWith(_)))
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self.cache.remove(key).await {
            Some(entry) if entry.is_live() => entry.decode().map(Some),
            _ => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.remove(key).await;
        Ok(())
    }
}
