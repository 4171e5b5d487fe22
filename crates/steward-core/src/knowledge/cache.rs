//! TTL cache with single-flight coalescing over a knowledge source.
//!
//! Concurrent cold-cache callers share exactly one upstream fetch: the first
//! caller installs a shared in-flight future, everyone else awaits it. The
//! slot mutex is only held for the compare-and-copy, never across an await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use super::entry::KnowledgeEntry;
use super::store::{KnowledgeSource, SourceMeta};
use crate::error::KnowledgeError;

/// One cached load, with enough provenance to answer `meta()` without
/// touching the underlying source.
#[derive(Clone)]
struct CachedSet {
    entries: Arc<Vec<KnowledgeEntry>>,
    source: String,
    fetched_at: Instant,
    synced_at: Option<DateTime<Utc>>,
}

type FetchFuture = Shared<BoxFuture<'static, Result<FetchOutcome, KnowledgeError>>>;

#[derive(Clone)]
struct FetchOutcome {
    entries: Arc<Vec<KnowledgeEntry>>,
    source: String,
    synced_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct CacheSlot {
    data: Option<CachedSet>,
    inflight: Option<FetchFuture>,
}

/// Single-slot knowledge cache. There is one knowledge set per process, so
/// the cache is keyed by nothing.
pub struct KnowledgeCache {
    source: Arc<dyn KnowledgeSource>,
    ttl: Duration,
    slot: Mutex<CacheSlot>,
    last_was_hit: AtomicBool,
}

impl KnowledgeCache {
    pub fn new(source: Arc<dyn KnowledgeSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slot: Mutex::new(CacheSlot::default()),
            last_was_hit: AtomicBool::new(false),
        }
    }

    /// Drop the cached set, forcing the next call to fetch.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock();
        slot.data = None;
    }

    async fn load(&self) -> Result<Arc<Vec<KnowledgeEntry>>, KnowledgeError> {
        let fut = {
            let mut slot = self.slot.lock();

            if let Some(data) = &slot.data {
                if data.fetched_at.elapsed() < self.ttl {
                    self.last_was_hit.store(true, Ordering::SeqCst);
                    return Ok(data.entries.clone());
                }
            }

            match &slot.inflight {
                Some(inflight) => inflight.clone(),
                None => {
                    let source = self.source.clone();
                    let fut: FetchFuture = async move {
                        let entries = source.entries().await?;
                        let meta = source.meta();
                        Ok(FetchOutcome {
                            entries,
                            source: meta.source,
                            synced_at: meta.last_sync,
                        })
                    }
                    .boxed()
                    .shared();
                    slot.inflight = Some(fut.clone());
                    debug!("knowledge cache miss, starting fetch");
                    fut
                }
            }
        };

        let result = fut.clone().await;

        {
            let mut slot = self.slot.lock();
            // Only clear the handle we installed; a newer fetch may already
            // be in flight by the time a slow waiter gets here.
            if slot.inflight.as_ref().is_some_and(|f| f.ptr_eq(&fut)) {
                slot.inflight = None;
            }
            if let Ok(outcome) = &result {
                slot.data = Some(CachedSet {
                    entries: outcome.entries.clone(),
                    source: outcome.source.clone(),
                    fetched_at: Instant::now(),
                    synced_at: outcome.synced_at,
                });
            }
        }

        self.last_was_hit.store(false, Ordering::SeqCst);
        result.map(|outcome| outcome.entries)
    }
}

#[async_trait]
impl KnowledgeSource for KnowledgeCache {
    async fn entries(&self) -> Result<Arc<Vec<KnowledgeEntry>>, KnowledgeError> {
        self.load().await
    }

    fn meta(&self) -> SourceMeta {
        let slot = self.slot.lock();
        match &slot.data {
            Some(data) => SourceMeta {
                source: data.source.clone(),
                cache_hit: self.last_was_hit.load(Ordering::SeqCst),
                last_sync: data.synced_at,
            },
            None => self.source.meta(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::store::FallbackKnowledgeSource;
    use crate::knowledge::testing::{sample_entry, CountingSource, SlowSource};

    #[tokio::test]
    async fn concurrent_cold_callers_share_one_fetch() {
        let source = Arc::new(SlowSource::new(vec![sample_entry("kb-1")], 50));
        let cache = Arc::new(KnowledgeCache::new(source.clone(), Duration::from_secs(60)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.entries().await }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(source.calls(), 1);
        for result in &results {
            assert_eq!(result.as_slice(), results[0].as_slice());
        }
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_a_hit() {
        let source = Arc::new(CountingSource::ok("remote", vec![sample_entry("kb-1")]));
        let cache = KnowledgeCache::new(source.clone(), Duration::from_secs(60));

        let _ = cache.entries().await.unwrap();
        assert!(!cache.meta().cache_hit);

        let _ = cache.entries().await.unwrap();
        assert!(cache.meta().cache_hit);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_refetch() {
        let source = Arc::new(CountingSource::ok("remote", vec![sample_entry("kb-1")]));
        let cache = KnowledgeCache::new(source.clone(), Duration::ZERO);

        let _ = cache.entries().await.unwrap();
        let _ = cache.entries().await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_clears_inflight_so_next_call_retries() {
        let source = Arc::new(CountingSource::failing("remote"));
        let cache = KnowledgeCache::new(source.clone(), Duration::from_secs(60));

        assert!(cache.entries().await.is_err());
        assert!(cache.entries().await.is_err());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn fallback_result_is_cached_with_fallback_provenance() {
        let remote = Arc::new(CountingSource::failing("remote"));
        let file = Arc::new(CountingSource::ok("file", vec![sample_entry("kb-f")]));
        let fallback = Arc::new(FallbackKnowledgeSource::new(remote.clone(), file.clone()));
        let cache = KnowledgeCache::new(fallback, Duration::from_secs(60));

        let entries = cache.entries().await.unwrap();
        assert_eq!(entries[0].id, "kb-f");
        assert_eq!(cache.meta().source, "file_fallback");

        // Within TTL: served from cache, no new upstream attempt.
        let _ = cache.entries().await.unwrap();
        assert!(cache.meta().cache_hit);
        assert_eq!(remote.calls(), 1);
        assert_eq!(file.calls(), 1);
    }
}
