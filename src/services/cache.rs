use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// Multi-tier cache manager
///
/// Implements L1 (in-memory) and optional L2 (Redis) caching. Only derived,
/// read-mostly data (match listings) goes through here; quota state is never
/// cached because it must be read inside the compare-and-swap loop.
pub struct CacheManager {
    redis: Option<Arc<tokio::sync::Mutex<ConnectionManager>>>,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    ttl_secs: u64,
    // Bumped by every delete
    invalidations: AtomicU64,
}

impl CacheManager {
    /// Create a cache manager, with a Redis tier when `redis_url` is given
    pub async fn new(redis_url: Option<&str>, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let redis = match redis_url {
            Some(url) => {
                let client = redis::Client::open(url)?;
                let manager = ConnectionManager::new(client).await?;
                Some(Arc::new(tokio::sync::Mutex::new(manager)))
            }
            None => None,
        };

        Ok(Self {
            redis,
            l1_cache: Self::build_l1(l1_size, ttl_secs),
            ttl_secs,
            invalidations: AtomicU64::new(0),
        })
    }

    /// In-memory only cache
    pub fn local(l1_size: u64, ttl_secs: u64) -> Self {
        Self {
            redis: None,
            l1_cache: Self::build_l1(l1_size, ttl_secs),
            ttl_secs,
            invalidations: AtomicU64::new(0),
        }
    }

    fn build_l1(l1_size: u64, ttl_secs: u64) -> moka::future::Cache<String, Vec<u8>> {
        moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build()
    }

    /// Get a value from cache (L1 first, then L2)
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(serde_json::from_slice(&bytes)?);
        }

        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            let value: Option<String> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut *conn)
                .await?;
            drop(conn);

            if let Some(json) = value {
                tracing::trace!("L2 cache hit: {}", key);
                self.l1_cache.insert(key.to_string(), json.as_bytes().to_vec()).await;
                return Ok(serde_json::from_str(&json)?);
            }
        }

        tracing::trace!("Cache miss: {}", key);
        Err(CacheError::CacheMiss(key.to_string()))
    }

    /// Set a value in every tier
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;
        self.l1_cache.insert(key.to_string(), json.as_bytes().to_vec()).await;

        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            let _: () = redis::cmd("SETEX")
                .arg(key)
                .arg(self.ttl_secs)
                .arg(json)
                .query_async(&mut *conn)
                .await?;
        }

        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    /// Invalidation counter to read before loading the value to be cached
    pub fn epoch(&self) -> u64 {
        self.invalidations.load(Ordering::Acquire)
    }

    /// Cache a value loaded after `epoch` was read, unless a delete ran since
    ///
    /// Returns whether the value was kept. The epoch is checked again after
    /// the write so a delete racing with it cannot leave the value behind.
    pub async fn set_unless_invalidated<T>(&self, key: &str, value: &T, epoch: u64) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        if self.epoch() != epoch {
            tracing::trace!("Skipping cache set after invalidation: {}", key);
            return Ok(false);
        }

        self.set(key, value).await?;

        if self.epoch() != epoch {
            self.delete(key).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Delete a value from every tier
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.invalidations.fetch_add(1, Ordering::AcqRel);
        self.l1_cache.invalidate(key).await;
        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            let _: () = redis::cmd("DEL")
                .arg(key)
                .query_async(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_size: self.l1_cache.entry_count(),
            l2_enabled: self.redis.is_some(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_size: u64,
    pub l2_enabled: bool,
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Build a cache key for a user's match listing
    pub fn matches(user_id: &str) -> String {
        format!("matches:{}", urlencoding::encode(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_cache_set_get_delete() {
        let cache = CacheManager::local(100, 60);

        cache.set("k", &vec!["m1".to_string()]).await.unwrap();
        let value: Vec<String> = cache.get("k").await.unwrap();
        assert_eq!(value, vec!["m1".to_string()]);

        cache.delete("k").await.unwrap();
        assert!(matches!(cache.get::<Vec<String>>("k").await, Err(CacheError::CacheMiss(_))));
        assert!(!cache.stats().l2_enabled);
    }

    #[tokio::test]
    async fn test_set_skipped_when_invalidated_during_load() {
        let cache = CacheManager::local(100, 60);
        let key = CacheKey::matches("a");

        let epoch = cache.epoch();
        // A swipe completes a match while the listing is being read
        cache.delete(&key).await.unwrap();

        let kept = cache.set_unless_invalidated(&key, &Vec::<String>::new(), epoch).await.unwrap();
        assert!(!kept);
        assert!(matches!(cache.get::<Vec<String>>(&key).await, Err(CacheError::CacheMiss(_))));

        let epoch = cache.epoch();
        let kept = cache.set_unless_invalidated(&key, &vec!["m1".to_string()], epoch).await.unwrap();
        assert!(kept);
        let value: Vec<String> = cache.get(&key).await.unwrap();
        assert_eq!(value, vec!["m1".to_string()]);
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_cache_set_get() {
        let cache = CacheManager::new(Some("redis://127.0.0.1:6379"), 1000, 60)
            .await
            .expect("Failed to create cache");

        cache.set("test_key", &"test_value").await.unwrap();
        let result: String = cache.get("test_key").await.unwrap();
        assert_eq!(result, "test_value");

        cache.delete("test_key").await.unwrap();
        assert!(cache.get::<String>("test_key").await.is_err());
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::matches("user123"), "matches:user123");
        assert_eq!(CacheKey::matches("a:b"), "matches:a%3Ab");
    }
}
