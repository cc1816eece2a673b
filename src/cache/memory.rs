// src/cache/memory.rs
//! Process-local cache used when no Redis URL is configured, and in tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{Cache, CacheError};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        // Opportunistic sweep so long-running dev servers don't grow forever
        entries.retain(|_, e| e.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        if entries.get(key).map_or(false, |e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        Ok(entries
            .remove(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries.get(key).map_or(false, |e| e.is_live(now)))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("user:1", "{}", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(cache.exists("user:1").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!cache.exists("user:1").await.unwrap());
        assert!(cache.get("user:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_if_absent_respects_expiry() {
        let cache = MemoryCache::new();
        let short = Duration::from_millis(50);

        assert!(cache.set_if_absent("lock", "true", short).await.unwrap());
        assert!(!cache.set_if_absent("lock", "true", short).await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.set_if_absent("lock", "true", short).await.unwrap());
    }

    #[tokio::test]
    async fn test_take_removes_entry() {
        let cache = MemoryCache::new();
        cache
            .set("sign-in-code:123456", "payload", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.take("sign-in-code:123456").await.unwrap().as_deref(),
            Some("payload")
        );
        assert!(cache.take("sign-in-code:123456").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_many() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("a", "1", ttl).await.unwrap();
        cache.set("b", "2", ttl).await.unwrap();
        cache.set("c", "3", ttl).await.unwrap();

        cache
            .delete(&["a".to_string(), "b".to_string(), "missing".to_string()])
            .await
            .unwrap();

        assert!(!cache.exists("a").await.unwrap());
        assert!(!cache.exists("b").await.unwrap());
        assert!(cache.exists("c").await.unwrap());
    }
}
