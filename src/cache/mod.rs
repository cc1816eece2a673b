//! # Cache Module
//!
//! Ephemeral key-value store with per-key TTL. It backs three things:
//! - read-through caching of user records and lists
//! - staging of pending registration / sign-in / password-reset data
//! - short-lived action locks that throttle follow/subscribe bursts
//!
//! Entries are always derived or transient; the database stays the source of
//! truth and any entry may be dropped at any time.

pub mod keys;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use memory::MemoryCache;
pub use redis::RedisCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raw string cache backend
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Set only when the key is absent. Returns whether the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, CacheError>;

    /// Read and delete in one atomic step
    async fn take(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;
}

/// Typed JSON layer over a [`Cache`] backend
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<dyn Cache>,
}

impl CacheClient {
    pub fn new(inner: Arc<dyn Cache>) -> Self {
        Self { inner }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.inner.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.inner.set(key, &raw, ttl).await
    }

    /// Write only when the key is free. Returns whether this call wrote it.
    pub async fn set_json_if_absent<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let raw = serde_json::to_string(value)?;
        self.inner.set_if_absent(key, &raw, ttl).await
    }

    pub async fn take_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.inner.take(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Boolean marker; any stored value counts as set
    pub async fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.inner.set(key, "true", ttl).await
    }

    /// Atomically acquire a flag key. `false` means someone already holds it.
    pub async fn acquire_flag(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.inner.set_if_absent(key, "true", ttl).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.exists(key).await
    }

    pub async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.inner.delete(keys).await
    }
}
