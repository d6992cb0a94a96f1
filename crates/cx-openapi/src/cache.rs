//! Time-bounded cache of parsed specifications.
//!
//! Documents are keyed by source (URL or file path) and served while younger
//! than the TTL. A miss fetches and parses without holding any lock, so two
//! concurrent misses for one source may both fetch; the later insert wins.
//! Nothing is inserted when fetching or parsing fails.

use crate::error::{PipelineError, Result};
use crate::guard::guarded;
use crate::parser::OpenApiParser;
use crate::types::SpecDocument;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cx_core::SessionContext;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default time-to-live for cached documents.
pub const DEFAULT_SPEC_TTL: Duration = Duration::from_secs(30 * 60);

/// Default deadline for one fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Retrieves the raw text of a specification.
#[async_trait]
pub trait SpecFetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<String>;
}

/// Fetches `http(s)://` sources over the network and anything else from disk.
#[derive(Debug, Clone, Default)]
pub struct HttpSpecFetcher {
    client: reqwest::Client,
}

impl HttpSpecFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn local_path(source: &str) -> PathBuf {
        match url::Url::parse(source) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .unwrap_or_else(|_| PathBuf::from(source)),
            _ => PathBuf::from(source),
        }
    }
}

#[async_trait]
impl SpecFetcher for HttpSpecFetcher {
    async fn fetch(&self, source: &str) -> Result<String> {
        if source.starts_with("http://") || source.starts_with("https://") {
            let response = self
                .client
                .get(source)
                .send()
                .await
                .map_err(|e| PipelineError::spec_load(source, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::spec_load(
                    source,
                    format!("server answered {}", status),
                ));
            }

            response
                .text()
                .await
                .map_err(|e| PipelineError::spec_load(source, e))
        } else {
            tokio::fs::read_to_string(Self::local_path(source))
                .await
                .map_err(|e| PipelineError::spec_load(source, e))
        }
    }
}

#[derive(Clone)]
struct CachedSpec {
    document: Arc<SpecDocument>,
    fetched_at: DateTime<Utc>,
}

/// Shared cache of dereferenced specifications.
pub struct SpecCache {
    entries: DashMap<String, CachedSpec>,
    fetcher: Arc<dyn SpecFetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl SpecCache {
    /// Cache with the HTTP/file fetcher, wall clock and default TTL.
    pub fn new() -> Self {
        Self::with_fetcher(Arc::new(HttpSpecFetcher::default()))
    }

    pub fn with_fetcher(fetcher: Arc<dyn SpecFetcher>) -> Self {
        Self {
            entries: DashMap::new(),
            fetcher,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_SPEC_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached document for `source`, fetching it when absent or expired.
    pub async fn load(&self, source: &str, session: &SessionContext) -> Result<Arc<SpecDocument>> {
        if let Some(document) = self.fresh_entry(source) {
            debug!("Spec cache hit: {}", source);
            return Ok(document);
        }

        info!("Fetching OpenAPI spec: {}", source);
        let content = guarded(
            session.cancellation(),
            self.fetch_timeout,
            "spec fetch",
            self.fetcher.fetch(source),
        )
        .await?;

        let origin = source.to_string();
        let document = tokio::task::spawn_blocking(move || {
            OpenApiParser::from_content(&content, &origin)?.parse()
        })
        .await
        .map_err(|e| PipelineError::spec_load(source, e))??;

        let document = Arc::new(document);
        self.entries.insert(
            source.to_string(),
            CachedSpec {
                document: Arc::clone(&document),
                fetched_at: self.clock.now(),
            },
        );
        info!(
            "Cached OpenAPI spec {} ({} operations)",
            source,
            document.operation_count()
        );
        Ok(document)
    }

    fn fresh_entry(&self, source: &str) -> Option<Arc<SpecDocument>> {
        let now = self.clock.now();
        let entry = self.entries.get(source)?.value().clone();

        // A timestamp in the future (clock adjustment) counts as fresh
        let fresh = now
            .signed_duration_since(entry.fetched_at)
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(true);

        if fresh {
            Some(entry.document)
        } else {
            debug!("Spec cache entry expired: {}", source);
            self.entries
                .remove_if(source, |_, current| current.fetched_at == entry.fetched_at);
            None
        }
    }

    /// Drop every cached document.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SpecCache {
    fn default() -> Self {
        Self::new()
    }
}
