//! Time-bounded key/value cache over an injected string store.
//!
//! Entries are persisted as `{"data": ..., "timestamp": ...}`. The TTL is
//! chosen by the reader on every `get`, so two call sites can tolerate
//! different staleness for the same key. Writes are last-writer-wins.

mod backend;
mod clock;
mod error;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use backend::{CacheBackend, FileBackend, MemoryBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CacheError;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    data: T,
    timestamp: DateTime<Utc>,
}

/// Handle to the shared cache. Cloning is cheap and every clone sees the
/// same backing store.
#[derive(Clone)]
pub struct LocalCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}

impl LocalCache {
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// In-memory cache on the system clock.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), Arc::new(SystemClock))
    }

    /// Read `key` if it was written no more than `ttl` ago.
    ///
    /// Expired and unparseable entries are deleted and reported as absent.
    /// Backend failures are logged and also reported as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding corrupt cache entry");
                self.remove_quietly(key).await;
                return None;
            }
        };

        if self.is_expired(entry.timestamp, ttl) {
            tracing::debug!(key, "cache entry expired");
            self.remove_quietly(key).await;
            return None;
        }

        Some(entry.data)
    }

    /// Store `data` under `key` stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] if `data` cannot be serialized, or the
    /// backend's error if the write fails.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<(), CacheError> {
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now(),
        };
        let raw = serde_json::to_string(&entry).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.backend.set(key, raw).await
    }

    /// # Errors
    ///
    /// Returns the backend's error if removal fails.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.backend.remove(key).await
    }

    /// Remove every key starting with `prefix`; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if listing or removal fails.
    pub async fn invalidate_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let keys = self.backend.list_keys().await?;
        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(prefix)) {
            self.backend.remove(key).await?;
            removed += 1;
        }
        tracing::debug!(prefix, removed, "invalidated cache prefix");
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns the backend's error if listing fails.
    pub async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        self.backend.list_keys().await
    }

    /// Read-through: return the fresh cached value or call `fetch`, cache
    /// its result, and return it. A failed cache write is logged, not
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns whatever `fetch` returns on failure; nothing is cached then.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key, ttl).await {
            return Ok(hit);
        }
        let fresh = fetch().await?;
        if let Err(e) = self.set(key, &fresh).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
        Ok(fresh)
    }

    fn is_expired(&self, written_at: DateTime<Utc>, ttl: Duration) -> bool {
        let age = self.clock.now() - written_at;
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age > ttl,
            // A TTL too large for chrono never expires.
            Err(_) => false,
        }
    }

    async fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.backend.remove(key).await {
            tracing::warn!(key, error = %e, "failed to remove cache entry");
        }
    }
}
