//! Knowledge backends: file, remote, and the remote-with-file-fallback wrapper.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::entry::{parse_document, KnowledgeEntry};
use crate::error::KnowledgeError;

/// Provenance of the most recent entry load.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceMeta {
    /// `file`, `remote`, or `file_fallback`.
    pub source: String,
    pub cache_hit: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SourceMeta {
    pub fn cold(source: &str) -> Self {
        Self {
            source: source.to_string(),
            cache_hit: false,
            last_sync: None,
        }
    }
}

/// A backend that can produce the current knowledge set.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Load the full entry set.
    async fn entries(&self) -> Result<Arc<Vec<KnowledgeEntry>>, KnowledgeError>;

    /// Provenance of the most recent `entries` call.
    fn meta(&self) -> SourceMeta;
}

// =========================================================================
// File backend
// =========================================================================

/// File-backed knowledge source. Reads and parses the document on demand.
pub struct FileKnowledgeSource {
    path: PathBuf,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl FileKnowledgeSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_sync: Mutex::new(None),
        }
    }
}

#[async_trait]
impl KnowledgeSource for FileKnowledgeSource {
    async fn entries(&self) -> Result<Arc<Vec<KnowledgeEntry>>, KnowledgeError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| KnowledgeError::Io(format!("{}: {}", self.path.display(), e)))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| KnowledgeError::Parse(e.to_string()))?;

        let entries = parse_document(&value);
        debug!(count = entries.len(), path = %self.path.display(), "loaded knowledge file");
        *self.last_sync.lock() = Some(Utc::now());
        Ok(Arc::new(entries))
    }

    fn meta(&self) -> SourceMeta {
        SourceMeta {
            source: "file".to_string(),
            cache_hit: false,
            last_sync: *self.last_sync.lock(),
        }
    }
}

// =========================================================================
// Remote backend
// =========================================================================

/// Bounded retry policy for the remote backend.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(150),
            max_jitter: Duration::from_millis(100),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Delay before the given (1-based) retry attempt: linear backoff plus jitter.
    fn delay_before(&self, attempt: u32) -> Duration {
        let jitter_ms = if self.max_jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..self.max_jitter.as_millis() as u64)
        };
        self.base_delay * attempt + Duration::from_millis(jitter_ms)
    }
}

/// Remote knowledge source fetching the document over HTTP.
///
/// Retries a small fixed number of times with jittered backoff, then fails
/// closed with `KnowledgeError::Upstream` so the fallback layer can take over.
pub struct RemoteKnowledgeSource {
    client: reqwest::Client,
    url: String,
    retry: RetryConfig,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl RemoteKnowledgeSource {
    pub fn new(url: String, retry: RetryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            retry,
            last_sync: Mutex::new(None),
        }
    }

    async fn fetch_once(&self) -> Result<serde_json::Value, KnowledgeError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.retry.request_timeout)
            .send()
            .await
            .map_err(|e| KnowledgeError::Upstream(e.to_string()))?
            .error_for_status()
            .map_err(|e| KnowledgeError::Upstream(e.to_string()))?;

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| KnowledgeError::Upstream(e.to_string()))
    }
}

#[async_trait]
impl KnowledgeSource for RemoteKnowledgeSource {
    async fn entries(&self) -> Result<Arc<Vec<KnowledgeEntry>>, KnowledgeError> {
        let mut last_err = KnowledgeError::Upstream("no attempts made".to_string());

        for attempt in 1..=self.retry.max_attempts {
            match self.fetch_once().await {
                Ok(value) => {
                    let entries = parse_document(&value);
                    debug!(count = entries.len(), url = %self.url, "fetched remote knowledge");
                    *self.last_sync.lock() = Some(Utc::now());
                    return Ok(Arc::new(entries));
                }
                Err(e) => {
                    debug!(attempt, error = %e, "remote knowledge fetch attempt failed");
                    last_err = e;
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay_before(attempt)).await;
                    }
                }
            }
        }

        Err(last_err)
    }

    fn meta(&self) -> SourceMeta {
        SourceMeta {
            source: "remote".to_string(),
            cache_hit: false,
            last_sync: *self.last_sync.lock(),
        }
    }
}

// =========================================================================
// Fallback wrapper
// =========================================================================

/// Serves the primary (remote) source, falling back to the file source when
/// the primary fails. The failure episode is logged once, not once per
/// request; the flag resets when the primary recovers.
pub struct FallbackKnowledgeSource {
    primary: Arc<dyn KnowledgeSource>,
    fallback: Arc<dyn KnowledgeSource>,
    degraded: AtomicBool,
    served_fallback: AtomicBool,
}

impl FallbackKnowledgeSource {
    pub fn new(primary: Arc<dyn KnowledgeSource>, fallback: Arc<dyn KnowledgeSource>) -> Self {
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(false),
            served_fallback: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl KnowledgeSource for FallbackKnowledgeSource {
    async fn entries(&self) -> Result<Arc<Vec<KnowledgeEntry>>, KnowledgeError> {
        match self.primary.entries().await {
            Ok(entries) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!("remote knowledge source recovered");
                }
                self.served_fallback.store(false, Ordering::SeqCst);
                Ok(entries)
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    warn!(error = %e, "remote knowledge unavailable, serving file fallback");
                }
                self.served_fallback.store(true, Ordering::SeqCst);
                self.fallback.entries().await
            }
        }
    }

    fn meta(&self) -> SourceMeta {
        if self.served_fallback.load(Ordering::SeqCst) {
            SourceMeta {
                source: "file_fallback".to_string(),
                cache_hit: false,
                last_sync: self.fallback.meta().last_sync,
            }
        } else {
            self.primary.meta()
        }
    }
}
