// src/cache/redis.rs
//! Redis-backed cache with connection pooling

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

use super::{Cache, CacheError};

#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(url: &str) -> Result<Self, CacheError> {
        let pool = PoolConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Backend(format!("failed to create Redis pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Round-trip a PING so startup fails fast on a bad URL
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Backend(format!("failed to get connection from pool: {}", e)))
    }
}

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

// Redis rejects EX 0, so sub-second TTLs round up.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(backend)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(key, value, ttl_seconds(ttl))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        conn.exists(key).await.map_err(backend)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(keys).await.map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_never_zero() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(300)), 300);
    }

    #[test]
    fn test_pool_creation_does_not_connect() {
        assert!(RedisCache::new("redis://127.0.0.1:6379").is_ok());
    }
}
