//! Knowledge store, retrieval, and caching.
//!
//! Backends are polymorphic over [`KnowledgeSource`]; the service composes
//! the configured backend behind a TTL cache with single-flight coalescing
//! and exposes token-overlap retrieval over the loaded set.

use std::path::PathBuf;
use std::sync::Arc;

pub mod cache;
pub mod entry;
pub mod retrieval;
pub mod store;

pub use cache::KnowledgeCache;
pub use entry::KnowledgeEntry;
pub use retrieval::{RetrievalMeta, RetrievalResult};
pub use store::{
    FallbackKnowledgeSource, FileKnowledgeSource, KnowledgeSource, RemoteKnowledgeSource,
    RetryConfig, SourceMeta,
};

use crate::config::{CoreConfig, KnowledgeSourceKind};
use crate::error::KnowledgeError;

/// Cached knowledge access plus retrieval, as one injectable service.
pub struct KnowledgeService {
    cache: KnowledgeCache,
    top_k: usize,
}

impl KnowledgeService {
    pub fn new(cache: KnowledgeCache, top_k: usize) -> Self {
        Self { cache, top_k }
    }

    /// Compose the configured backend stack: a plain file source, or a
    /// remote source wrapped in the file fallback, both behind the cache.
    pub fn from_config(
        config: &CoreConfig,
        knowledge_file: PathBuf,
        remote_url: Option<String>,
    ) -> Self {
        let file = Arc::new(FileKnowledgeSource::new(knowledge_file));
        let source: Arc<dyn KnowledgeSource> = match (config.kb_source, remote_url) {
            (KnowledgeSourceKind::Remote, Some(url)) => Arc::new(FallbackKnowledgeSource::new(
                Arc::new(RemoteKnowledgeSource::new(url, RetryConfig::default())),
                file,
            )),
            (KnowledgeSourceKind::Remote, None) => {
                tracing::warn!("remote knowledge selected but no URL configured, using file");
                file
            }
            (KnowledgeSourceKind::File, _) => file,
        };

        Self::new(
            KnowledgeCache::new(source, config.kb_cache_ttl),
            config.kb_top_k,
        )
    }

    /// Load the current entry set through the cache.
    pub async fn entries(&self) -> Result<Arc<Vec<KnowledgeEntry>>, KnowledgeError> {
        self.cache.entries().await
    }

    /// Provenance of the most recent load.
    pub fn meta(&self) -> SourceMeta {
        self.cache.meta()
    }

    /// Configured retrieval entry cap.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Rank the knowledge set against `query`, keeping the configured top-K.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<RetrievalResult, KnowledgeError> {
        let entries = self.cache.entries().await?;
        let meta = self.cache.meta();
        Ok(retrieval::rank(
            &entries,
            query,
            top_k.unwrap_or(self.top_k),
            &meta.source,
            meta.cache_hit,
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingSource;
    use super::*;
    use crate::knowledge::entry::KnowledgeEntry;
    use std::time::Duration;

    fn entry(id: &str, content: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.to_string(),
            title: String::new(),
            tags: Vec::new(),
            applies_to: Vec::new(),
            priority: 0.3,
            content: content.to_string(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn search_ranks_through_the_cache() {
        let source = Arc::new(CountingSource::ok(
            "file",
            vec![
                entry("kb-billing", "billing escalation rules for invoices"),
                entry("kb-hr", "vacation policy"),
            ],
        ));
        let service = KnowledgeService::new(
            KnowledgeCache::new(source.clone(), Duration::from_secs(60)),
            6,
        );

        let result = service.search("billing invoices", None).await.unwrap();
        assert_eq!(result.selected_ids, vec!["kb-billing"]);
        assert_eq!(result.meta.total_loaded, 2);
        assert!(!result.meta.cache_hit);

        let again = service.search("billing invoices", None).await.unwrap();
        assert!(again.meta.cache_hit);
        assert_eq!(source.calls(), 1);
    }
}
