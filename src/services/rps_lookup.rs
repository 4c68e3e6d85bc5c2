//! Serves persisted ranking artifacts
//!
//! Artifacts are loaded from an ordered list of sources (remote copy first,
//! local files second), kept in memory for an hour, and reloaded lazily on
//! the next lookup after that. A reload that fails everywhere keeps the
//! previously loaded data.

use super::cache::{Cached, ExpiringCache, StalePolicy};
use crate::constants::{
    FAILED_REFRESH_BACKOFF_SECS, FULL_RANKING_FILE, RANKING_TTL_SECS, TOP_RANKING_FILE, TOP_RPS_THRESHOLD,
};
use crate::error::{AppError, Result};
use crate::models::{normalize_code, RankWindow, RankingRecord, RankingSet, TopRankingSet};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const RANKINGS_KEY: &str = "rankings";

/// One place the ranking artifacts can be read from
#[async_trait]
pub trait RankingSource: Send + Sync {
    fn name(&self) -> &str;
    async fn load_full(&self) -> Result<RankingSet>;
    async fn load_top(&self) -> Result<TopRankingSet>;
}

/// Artifacts in a local directory, as written by the ranking job
pub struct LocalRankingSource {
    dir: PathBuf,
}

impl LocalRankingSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl RankingSource for LocalRankingSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn load_full(&self) -> Result<RankingSet> {
        self.read(FULL_RANKING_FILE).await
    }

    async fn load_top(&self) -> Result<TopRankingSet> {
        self.read(TOP_RANKING_FILE).await
    }
}

/// Artifacts published under an HTTP base URL
pub struct RemoteRankingSource {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteRankingSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, file);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RankingSource for RemoteRankingSource {
    fn name(&self) -> &str {
        "remote"
    }

    async fn load_full(&self) -> Result<RankingSet> {
        self.fetch(FULL_RANKING_FILE).await
    }

    async fn load_top(&self) -> Result<TopRankingSet> {
        self.fetch(TOP_RANKING_FILE).await
    }
}

/// Ranking artifacts as loaded from one source
#[derive(Debug, Clone)]
pub struct LoadedRankings {
    pub full: RankingSet,
    pub top: TopRankingSet,
    /// Name of the source that served them
    pub source: String,
    index: HashMap<String, usize>,
}

impl LoadedRankings {
    pub fn new(full: RankingSet, top: TopRankingSet, source: impl Into<String>) -> Self {
        let mut index = HashMap::with_capacity(full.len());
        for (i, record) in full.records.iter().enumerate() {
            index.entry(record.code.clone()).or_insert(i);
        }
        Self {
            full,
            top,
            source: source.into(),
            index,
        }
    }

    pub fn get(&self, code: &str) -> Option<&RankingRecord> {
        self.index.get(code).map(|&i| &self.full.records[i])
    }

    /// Leaders for `window`, derived from the full set when the top
    /// document has no entry for it
    pub fn top(&self, window: RankWindow) -> Vec<RankingRecord> {
        match self.top.get(window) {
            Some(records) => records.to_vec(),
            None => TopRankingSet::from_ranking(&self.full, &[window], TOP_RPS_THRESHOLD)
                .get(window)
                .map(<[RankingRecord]>::to_vec)
                .unwrap_or_default(),
        }
    }
}

pub struct RankingLookup {
    sources: Vec<Arc<dyn RankingSource>>,
    cache: ExpiringCache<&'static str, Arc<LoadedRankings>>,
    ttl: Duration,
}

impl RankingLookup {
    /// Sources are tried in order; the first that loads wins
    pub fn new(sources: Vec<Arc<dyn RankingSource>>) -> Self {
        Self {
            sources,
            cache: ExpiringCache::new("rankings")
                .with_failure_backoff(Duration::from_secs(FAILED_REFRESH_BACKOFF_SECS)),
            ttl: Duration::from_secs(RANKING_TTL_SECS),
        }
    }

    /// Remote copy (when configured) followed by the local output directory
    pub fn from_config(remote_url: Option<&str>, local_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let mut sources: Vec<Arc<dyn RankingSource>> = Vec::new();
        if let Some(url) = remote_url {
            sources.push(Arc::new(RemoteRankingSource::new(url, timeout)?));
        }
        sources.push(Arc::new(LocalRankingSource::new(local_dir)));
        Ok(Self::new(sources))
    }

    async fn load(&self) -> Result<LoadedRankings> {
        let mut failures = Vec::new();

        for source in &self.sources {
            let full = match source.load_full().await {
                Ok(full) => full,
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "Failed to load full ranking");
                    failures.push(format!("{}: {}", source.name(), e));
                    continue;
                }
            };

            let top = match source.load_top().await {
                Ok(top) => top,
                Err(e) => {
                    tracing::warn!(
                        source = source.name(),
                        error = %e,
                        "Failed to load top ranking, deriving it from the full ranking"
                    );
                    TopRankingSet::from_ranking(&full, &RankWindow::ALL, TOP_RPS_THRESHOLD)
                }
            };

            tracing::info!(source = source.name(), records = full.len(), "Loaded ranking artifacts");
            return Ok(LoadedRankings::new(full, top, source.name()));
        }

        Err(AppError::Unavailable(format!(
            "No ranking source could be loaded ({})",
            failures.join("; ")
        )))
    }

    /// Loaded artifacts, reloading once the staleness window has passed
    pub async fn get_loaded(&self) -> Result<Cached<Arc<LoadedRankings>>> {
        let ttl = self.ttl;
        self.cache
            .get_or_refresh(RANKINGS_KEY, StalePolicy::ServeStale, || async move {
                self.load().await.map(|loaded| (Arc::new(loaded), ttl))
            })
            .await
    }

    /// Load now regardless of the staleness window
    ///
    /// On failure the previously loaded data stays in place.
    pub async fn reload(&self) -> Result<()> {
        let loaded = self.load().await?;
        self.cache.put(RANKINGS_KEY, Arc::new(loaded), self.ttl).await;
        Ok(())
    }

    pub async fn get_rank(&self, input: &str) -> Result<Option<RankingRecord>> {
        let code = normalize_code(input)?;
        let loaded = self.get_loaded().await?;
        Ok(loaded.value.get(&code).cloned())
    }

    pub async fn get_top(&self, window: RankWindow) -> Result<Vec<RankingRecord>> {
        let loaded = self.get_loaded().await?;
        Ok(loaded.value.top(window))
    }
}
