use super::cache::{Cached, ExpiringCache, StalePolicy};
use super::source::SharedSource;
use super::trading_hours::SessionGate;
use crate::constants::{
    FAILED_REFRESH_BACKOFF_SECS, SNAPSHOT_TTL_CLOSED_SECS, SNAPSHOT_TTL_TRADING_SECS,
};
use crate::error::{AppError, Result};
use crate::models::{normalize_code, MarketSnapshot, Quote, Symbol};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const SNAPSHOT_KEY: &str = "spot";

/// Holds the single current full-market quote table
///
/// The table is refreshed through the expiring cache with a session-aware
/// TTL. A failed or empty refresh keeps serving the previous table, labeled
/// stale; with no previous table the caller gets `Unavailable`.
pub struct SnapshotProvider {
    source: SharedSource,
    gate: Arc<SessionGate>,
    cache: ExpiringCache<&'static str, Arc<MarketSnapshot>>,
    fetch_timeout: Duration,
}

impl SnapshotProvider {
    pub fn new(source: SharedSource, gate: Arc<SessionGate>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            gate,
            cache: ExpiringCache::new("snapshot")
                .with_failure_backoff(Duration::from_secs(FAILED_REFRESH_BACKOFF_SECS)),
            fetch_timeout,
        }
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// TTL for a snapshot captured at `now`
    pub fn ttl_for(&self, now: DateTime<Utc>) -> Duration {
        self.gate.select_ttl(
            now,
            Duration::from_secs(SNAPSHOT_TTL_TRADING_SECS),
            Duration::from_secs(SNAPSHOT_TTL_CLOSED_SECS),
        )
    }

    pub async fn get_snapshot(&self) -> Result<Cached<Arc<MarketSnapshot>>> {
        self.cache
            .get_or_refresh(SNAPSHOT_KEY, StalePolicy::ServeStale, || self.refresh())
            .await
    }

    #[instrument(skip(self), fields(source = self.source.name()))]
    async fn refresh(&self) -> Result<(Arc<MarketSnapshot>, Duration)> {
        let started = std::time::Instant::now();
        let quotes = match tokio::time::timeout(self.fetch_timeout, self.source.fetch_spot_table()).await {
            Ok(Ok(quotes)) => quotes,
            Ok(Err(e)) => {
                warn!(error = %e, "Spot table fetch failed");
                return Err(AppError::Unavailable(format!("spot table fetch failed: {}", e)));
            }
            Err(_) => {
                warn!(timeout_secs = self.fetch_timeout.as_secs(), "Spot table fetch timed out");
                return Err(AppError::Unavailable("spot table fetch timed out".to_string()));
            }
        };

        if quotes.is_empty() {
            warn!("Spot table fetch returned no rows");
            return Err(AppError::Unavailable("spot table is empty".to_string()));
        }

        let now = Utc::now();
        let snapshot = MarketSnapshot::new(quotes, now);
        let ttl = self.ttl_for(now);
        info!(
            symbols = snapshot.len(),
            ttl_secs = ttl.as_secs(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Refreshed market snapshot"
        );
        Ok((Arc::new(snapshot), ttl))
    }

    /// Current symbol universe
    pub async fn symbols(&self) -> Result<Vec<Symbol>> {
        Ok(self.get_snapshot().await?.value.symbols())
    }

    /// One row of the current snapshot
    ///
    /// Input that is not a six-digit code, or a code missing from the
    /// snapshot, is rejected as an unknown symbol.
    pub async fn get_quote(&self, input: &str) -> Result<Cached<Quote>> {
        let code = normalize_code(input)?;
        let snapshot = self.get_snapshot().await?;
        let quote = snapshot
            .value
            .get(&code)
            .cloned()
            .ok_or_else(|| AppError::UnknownSymbol(code.clone()))?;
        Ok(Cached {
            value: quote,
            freshness: snapshot.freshness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_quote;
    use crate::services::cache::Freshness;
    use crate::services::source::scripted::ScriptedSource;

    fn provider(source: Arc<ScriptedSource>) -> SnapshotProvider {
        SnapshotProvider::new(source, Arc::new(SessionGate::new(None)), Duration::from_secs(10))
    }

    fn quotes() -> Vec<Quote> {
        vec![
            sample_quote("600000", "浦发银行", Some(1.2)),
            sample_quote("000001", "平安银行", Some(-0.4)),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_lookup_within_ttl_does_not_refetch() {
        let source = Arc::new(ScriptedSource::new().with_spot(quotes()));
        let provider = provider(source.clone());

        let first = provider.get_snapshot().await.unwrap();
        let second = provider.get_snapshot().await.unwrap();

        assert!(Arc::ptr_eq(&first.value, &second.value));
        assert_eq!(source.spot_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_returns_previous_snapshot() {
        let source = Arc::new(ScriptedSource::new().with_spot(quotes()));
        let provider = provider(source.clone());

        let t0 = provider.get_snapshot().await.unwrap();
        assert_eq!(t0.freshness, Freshness::Fresh);

        // Past both the in-session and the closed TTL
        tokio::time::advance(Duration::from_secs(SNAPSHOT_TTL_CLOSED_SECS + 1)).await;
        source.set_spot_failing(true);

        let fallback = provider.get_snapshot().await.unwrap();
        assert_eq!(fallback.freshness, Freshness::Stale);
        assert_eq!(fallback.value.captured_at, t0.value.captured_at);
        assert!(Arc::ptr_eq(&fallback.value, &t0.value));
        assert_eq!(source.spot_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_costs_one_fetch_for_concurrent_callers() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_spot(quotes())
                .with_spot_delay(Duration::from_secs(5)),
        );
        let provider = provider(source.clone());
        provider.get_snapshot().await.unwrap();

        tokio::time::advance(Duration::from_secs(SNAPSHOT_TTL_CLOSED_SECS + 1)).await;
        source.set_spot_failing(true);

        let started = tokio::time::Instant::now();
        let results = futures::future::join_all((0..6).map(|_| provider.get_snapshot())).await;

        assert!(results.iter().all(|r| matches!(r, Ok(s) if s.is_stale())));
        assert_eq!(source.spot_calls(), 2);
        assert!(started.elapsed() < Duration::from_secs(10));

        // Replayed within the backoff window, retried after it
        provider.get_snapshot().await.unwrap();
        assert_eq!(source.spot_calls(), 2);
        tokio::time::advance(Duration::from_secs(FAILED_REFRESH_BACKOFF_SECS)).await;
        provider.get_snapshot().await.unwrap();
        assert_eq!(source.spot_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_refresh_returns_previous_snapshot() {
        let source = Arc::new(ScriptedSource::new().with_spot(quotes()));
        let provider = provider(source.clone());
        let t0 = provider.get_snapshot().await.unwrap();

        tokio::time::advance(Duration::from_secs(SNAPSHOT_TTL_CLOSED_SECS + 1)).await;
        source.set_spot(Vec::new());

        let fallback = provider.get_snapshot().await.unwrap();
        assert!(fallback.is_stale());
        assert_eq!(fallback.value.len(), t0.value.len());
    }

    #[tokio::test]
    async fn test_no_previous_snapshot_is_unavailable() {
        let source = Arc::new(ScriptedSource::new());
        source.set_spot_failing(true);
        let provider = provider(source);

        assert!(matches!(provider.get_snapshot().await, Err(AppError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_spot(quotes())
                .with_spot_delay(Duration::from_secs(30)),
        );
        let provider = provider(source);

        assert!(matches!(provider.get_snapshot().await, Err(AppError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_get_quote() {
        let source = Arc::new(ScriptedSource::new().with_spot(quotes()));
        let provider = provider(source);

        let quote = provider.get_quote("sh600000").await.unwrap();
        assert_eq!(quote.value.name, "浦发银行");
        assert!(matches!(provider.get_quote("300750").await, Err(AppError::UnknownSymbol(_))));
        assert!(matches!(provider.get_quote("abc").await, Err(AppError::UnknownSymbol(_))));
    }
}
