//! Cache layer
//!
//! Read-through cache for catalogue reads. Keys are namespaced by prefix
//! (`course:`, `tag:`, `creator:`) so a write can drop everything derived
//! from the data it touched with one `delete_prefix` call.
//!
//! - In-memory cache (moka), the default
//! - Redis cache behind the `redis-cache` feature, for multi-instance deployments

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

/// Cache layer trait
///
/// The generic methods make this trait unusable as `dyn CacheLayer`; use the
/// `Cache` enum for runtime selection.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Store `value` for `ttl`, replacing any previous entry and its TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key starting with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Configured cache backend
#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    #[cfg(feature = "redis-cache")]
    Redis(RedisCache),
}

impl Cache {
    /// Configured upper bound for cached reads
    pub fn default_ttl(&self) -> Duration {
        match self {
            Cache::Memory(cache) => cache.default_ttl(),
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.default_ttl(),
        }
    }
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_prefix(prefix).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete_prefix(prefix).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.clear().await,
        }
    }
}

/// Build the cache selected by `config`.
///
/// Fails if Redis is selected without a URL, or without the `redis-cache`
/// feature compiled in.
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    let ttl = Duration::from_secs(config.ttl_seconds);

    match config.driver {
        CacheDriver::Memory => Ok(Arc::new(Cache::Memory(MemoryCache::new(ttl)))),
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_deref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Redis URL is required when using the Redis cache driver. \
                         Set 'cache.redis_url' or COURSEHUB_CACHE_REDIS_URL."
                    )
                })?;
                let cache = RedisCache::connect(redis_url, ttl).await?;
                Ok(Arc::new(Cache::Redis(cache)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "Redis cache driver is configured but the 'redis-cache' feature is not enabled"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();

        cache
            .set("course:list", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<Vec<i32>> = cache.get("course:list").await.unwrap();
        assert_eq!(result, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_delete_prefix_through_enum() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();
        let ttl = Duration::from_secs(60);
        cache.set("course:slug:a", &"a", ttl).await.unwrap();
        cache.set("tag:list", &"t", ttl).await.unwrap();

        cache.delete_prefix("course:").await.unwrap();

        assert_eq!(cache.get::<String>("course:slug:a").await.unwrap(), None);
        assert_eq!(cache.get::<String>("tag:list").await.unwrap(), Some("t".to_string()));
    }

    #[cfg(not(feature = "redis-cache"))]
    #[tokio::test]
    async fn test_redis_without_feature_fails() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: Some("redis://localhost:6379".to_string()),
            ttl_seconds: 60,
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("redis-cache"));
    }

    #[cfg(feature = "redis-cache")]
    #[tokio::test]
    async fn test_redis_without_url_fails() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: None,
            ttl_seconds: 60,
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("Redis URL"));
    }
}
