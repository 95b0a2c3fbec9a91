//! Read-through list cache
//!
//! An explicit cache collaborator for strategies that must load a full
//! collection client-side. Exposes a freshness flag so callers and tests
//! can distinguish cache hits from live loads. Concurrent population
//! attempts are idempotent and safe to race.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;

/// Result of a cache read, carrying the freshness flag
#[derive(Debug, Clone)]
pub struct CacheLoad<T> {
    pub items: Arc<Vec<T>>,
    pub from_cache: bool,
}

/// In-memory cache for a full collection. Not durable across restarts.
#[derive(Debug, Default)]
pub struct ListCache<T> {
    slot: RwLock<Option<Arc<Vec<T>>>>,
}

impl<T: Send + Sync> ListCache<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Return the cached collection, or populate it with `loader`.
    ///
    /// Racing loaders may each run once; last write wins, which is safe
    /// because every load observes the same upstream collection.
    pub async fn get_or_load<F, Fut>(&self, loader: F) -> Result<CacheLoad<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        if let Some(items) = self.slot.read().await.clone() {
            return Ok(CacheLoad {
                items,
                from_cache: true,
            });
        }

        let items = Arc::new(loader().await?);
        *self.slot.write().await = Some(Arc::clone(&items));

        Ok(CacheLoad {
            items,
            from_cache: false,
        })
    }

    /// Drop the cached collection; the next read loads live
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_read_is_a_cache_hit() {
        let cache = ListCache::new();
        let loads = AtomicUsize::new(0);

        let first = cache
            .get_or_load(|| async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            })
            .await
            .unwrap();
        assert!(!first.from_cache);

        let second = cache
            .get_or_load(|| async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(vec![4, 5, 6])
            })
            .await
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(*second.items, vec![1, 2, 3]);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_failures_are_not_cached() {
        let cache: ListCache<i32> = ListCache::new();

        let failed = cache
            .get_or_load(|| async { Err(crate::error::ServiceError::network("down")) })
            .await;
        assert!(failed.is_err());

        let recovered = cache.get_or_load(|| async { Ok(vec![7]) }).await.unwrap();
        assert!(!recovered.from_cache);
        assert_eq!(*recovered.items, vec![7]);
    }

    #[tokio::test]
    async fn invalidate_forces_a_live_load() {
        let cache = ListCache::new();
        cache.get_or_load(|| async { Ok(vec![1]) }).await.unwrap();
        cache.invalidate().await;

        let reloaded = cache.get_or_load(|| async { Ok(vec![2]) }).await.unwrap();
        assert!(!reloaded.from_cache);
        assert_eq!(*reloaded.items, vec![2]);
    }
}
