//! Fetch coordination on top of a [`QueryCache`].

use crate::cache::{CachedValue, QueryCache, QueryKey};
use crate::error::{MusicdexError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// How long a query result is served from cache and how long it is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Age below which a non-invalidated entry is returned without fetching
    pub stale_time: Duration,
    /// Time an entry is kept after its last write
    pub cache_time: Duration,
}

impl FetchConfig {
    pub const fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        DEFAULT_FETCH_CONFIG
    }
}

/// Always revalidate, keep results for five minutes.
pub const DEFAULT_FETCH_CONFIG: FetchConfig =
    FetchConfig::new(Duration::ZERO, Duration::from_secs(5 * 60));

/// Starred playlists change rarely; serve and keep them for a day.
pub const STARRED_FETCH_CONFIG: FetchConfig = FetchConfig::new(
    Duration::from_secs(24 * 60 * 60),
    Duration::from_secs(24 * 60 * 60),
);

/// Runs fetchers against a shared [`QueryCache`].
///
/// Concurrent fetches of one key are collapsed: the second caller waits for
/// the first and reuses its result if it is still fresh.
pub struct QueryClient {
    cache: Arc<dyn QueryCache>,
    key_locks: Mutex<HashMap<QueryKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl QueryClient {
    pub fn new(cache: Arc<dyn QueryCache>) -> Self {
        Self {
            cache,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    /// Cached value for `key` without fetching, stale or not.
    pub fn peek(&self, key: &QueryKey) -> Option<CachedValue> {
        self.cache.get(key).map(|entry| entry.value)
    }

    /// Return the cached value for `key` if fresh, otherwise run `fetcher`.
    ///
    /// The fetcher receives the current (possibly stale) value. Its result is
    /// stored unless the key was invalidated while it ran, in which case the
    /// call fails with [`MusicdexError::Cancelled`].
    pub async fn fetch<F, Fut>(
        &self,
        key: QueryKey,
        config: FetchConfig,
        fetcher: F,
    ) -> Result<CachedValue>
    where
        F: FnOnce(Option<CachedValue>) -> Fut,
        Fut: Future<Output = Result<CachedValue>>,
    {
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let cached = self.cache.get(&key);
        if let Some(entry) = &cached {
            if entry.is_fresh(config.stale_time) {
                debug!(key = %key, "Serving fresh cache entry");
                return Ok(entry.value.clone());
            }
        }

        let ticket = self.cache.begin_fetch(&key);
        let outcome = tokio::select! {
            biased;
            () = ticket.token().cancelled() => None,
            result = fetcher(cached.map(|entry| entry.value)) => Some(result),
        };

        match outcome {
            Some(Ok(value)) => {
                if self
                    .cache
                    .complete_fetch(&key, &ticket, value.clone(), config.cache_time)
                {
                    Ok(value)
                } else {
                    debug!(key = %key, "Discarding result of superseded fetch");
                    Err(MusicdexError::Cancelled {
                        key: key.to_string(),
                    })
                }
            }
            Some(Err(e)) => {
                self.cache.abandon_fetch(&key, &ticket);
                Err(e)
            }
            None => {
                debug!(key = %key, "Fetch cancelled");
                Err(MusicdexError::Cancelled {
                    key: key.to_string(),
                })
            }
        }
    }

    /// Cancel running fetches for every key, then mark them all stale.
    pub fn invalidate_group(&self, keys: &[QueryKey]) {
        for key in keys {
            self.cache.cancel_inflight(key);
        }
        for key in keys {
            self.cache.invalidate(key);
        }
        let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
        debug!(keys = ?names, "Invalidated queries");
    }

    /// Drop every cached value and per-key lock.
    pub fn clear(&self) {
        self.cache.clear();
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn key_lock(&self, key: &QueryKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Forget locks nobody is holding or waiting on.
        locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryQueryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client() -> QueryClient {
        QueryClient::new(Arc::new(MemoryQueryCache::new()))
    }

    const FRESH_FOR_A_MINUTE: FetchConfig =
        FetchConfig::new(Duration::from_secs(60), Duration::from_secs(600));

    #[tokio::test]
    async fn test_fresh_entry_skips_fetcher() {
        let client = client();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = client
                .fetch(QueryKey::song_like("s1"), FRESH_FOR_A_MINUTE, |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedValue::Liked(true))
                })
                .await
                .unwrap();
            assert_eq!(value.as_liked(), Some(true));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_stale_time_refetches_with_previous_value() {
        let client = client();
        let key = QueryKey::song_like("s1");

        client
            .fetch(key.clone(), DEFAULT_FETCH_CONFIG, |previous| async move {
                assert!(previous.is_none());
                Ok(CachedValue::Liked(false))
            })
            .await
            .unwrap();

        let value = client
            .fetch(key, DEFAULT_FETCH_CONFIG, |previous| async move {
                assert_eq!(previous.and_then(|v| v.as_liked()), Some(false));
                Ok(CachedValue::Liked(true))
            })
            .await
            .unwrap();
        assert_eq!(value.as_liked(), Some(true));
    }

    #[tokio::test]
    async fn test_invalidation_forces_refetch() {
        let client = client();
        let key = QueryKey::song_like("s1");
        let calls = AtomicUsize::new(0);

        let fetch = || {
            client.fetch(key.clone(), FRESH_FOR_A_MINUTE, |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CachedValue::Liked(true))
            })
        };

        fetch().await.unwrap();
        client.invalidate_group(&[key.clone()]);
        fetch().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let client = client();
        let key = QueryKey::AllPlaylists;

        let result = client
            .fetch(key.clone(), DEFAULT_FETCH_CONFIG, |_| async {
                Err(MusicdexError::ServerError {
                    status: 500,
                    message: "boom".into(),
                })
            })
            .await;

        assert!(matches!(result, Err(MusicdexError::ServerError { status: 500, .. })));
        assert!(client.peek(&key).is_none());
    }

    #[tokio::test]
    async fn test_invalidation_cancels_inflight_fetch() {
        let client = Arc::new(client());
        let key = QueryKey::playlist_like("p1");
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let task = {
            let client = Arc::clone(&client);
            let key = key.clone();
            tokio::spawn(async move {
                client
                    .fetch(key, DEFAULT_FETCH_CONFIG, |_| async move {
                        let _ = started_tx.send(());
                        std::future::pending::<()>().await;
                        Ok(CachedValue::LikeStatus(Arc::new(vec![true])))
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        client.invalidate_group(&[key.clone()]);

        let result = task.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
        assert!(client.peek(&key).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_collapsed() {
        let client = Arc::new(client());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let client = Arc::clone(&client);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                client
                    .fetch(QueryKey::StarredPlaylists, STARRED_FETCH_CONFIG, |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(CachedValue::Playlists(Arc::new(Vec::new())))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
