pub mod cache;
pub mod eastmoney;
pub mod indicator_pipeline;
pub mod market_stats;
pub mod price_view;
pub mod ranking;
pub mod rps_lookup;
pub mod snapshot;
pub mod source;
pub mod trading_hours;

pub use cache::{Cached, ExpiringCache, Freshness, StalePolicy};
pub use eastmoney::EastmoneyClient;
pub use indicator_pipeline::{build_bundle, IndicatorPipeline, MAX_HISTORY_DAYS};
pub use market_stats::{list_top_movers, market_stats, search, MarketStats};
pub use price_view::{price_view, Part, PriceView};
pub use ranking::{RankingJob, RankingOutcome};
pub use rps_lookup::{LocalRankingSource, RankingLookup, RankingSource, RemoteRankingSource};
pub use snapshot::SnapshotProvider;
pub use source::{MarketDataSource, SharedSource};
pub use trading_hours::{HolidayCalendar, SessionGate};

use crate::error::Result;
use crate::models::{Quote, RankWindow, Symbol, Venue};
use crate::utils::AppConfig;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

/// Every long-lived component, wired once per process
///
/// The snapshot provider is shared by the pipeline and the ranking job so
/// the universe check and the batch see the same table.
pub struct Services {
    pub config: AppConfig,
    pub snapshots: Arc<SnapshotProvider>,
    pub rankings: Arc<RankingLookup>,
    pub pipeline: Arc<IndicatorPipeline>,
    pub ranking_job: Arc<RankingJob>,
    ranking_running: Arc<Mutex<()>>,
}

/// Exclusive right to run a ranking pass, held for the whole pass
pub type RankingClaim = OwnedMutexGuard<()>;

pub type SharedServices = Arc<Services>;

impl Services {
    /// Wire against the live Eastmoney feed
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let client: SharedSource = Arc::new(EastmoneyClient::new(config.fetch_timeout)?);
        Self::with_source(config, client)
    }

    pub fn with_source(config: AppConfig, source: SharedSource) -> Result<Self> {
        let gate = Arc::new(SessionGate::from_calendar_file(config.holiday_calendar_file.as_deref()));
        let snapshots = Arc::new(SnapshotProvider::new(source.clone(), gate, config.fetch_timeout));
        let rankings = Arc::new(RankingLookup::from_config(
            config.remote_ranking_url.as_deref(),
            config.output_dir.clone(),
            config.fetch_timeout,
        )?);
        let pipeline = Arc::new(IndicatorPipeline::new(
            source.clone(),
            snapshots.clone(),
            rankings.clone(),
            config.fetch_timeout,
        ));
        let ranking_job = Arc::new(RankingJob::new(
            source.clone(),
            snapshots.clone(),
            config.output_dir.clone(),
            config.ranking_concurrency,
            config.fetch_timeout,
            config.ranking_deadline,
        ));

        info!(
            source = source.name(),
            output_dir = %config.output_dir.display(),
            remote_rankings = config.remote_ranking_url.is_some(),
            concurrency = config.ranking_concurrency,
            "Services initialized"
        );

        Ok(Self {
            config,
            snapshots,
            rankings,
            pipeline,
            ranking_job,
            ranking_running: Arc::new(Mutex::new(())),
        })
    }

    pub async fn market_stats(&self) -> Result<MarketStats> {
        let snapshot = self.snapshots.get_snapshot().await?;
        Ok(market_stats(&snapshot.value, snapshot.is_stale()))
    }

    pub async fn search(&self, keyword: &str) -> Result<Vec<Symbol>> {
        let snapshot = self.snapshots.get_snapshot().await?;
        Ok(search(&snapshot.value, keyword))
    }

    pub async fn list_top_movers(&self, venue: Option<Venue>, limit: usize) -> Result<Cached<Vec<Quote>>> {
        let snapshot = self.snapshots.get_snapshot().await?;
        Ok(snapshot.map(|s| list_top_movers(&s, venue, limit)))
    }

    pub async fn price_view(&self, input: &str, detail: bool, include_intraday: bool) -> Result<PriceView> {
        price_view(&self.snapshots, &self.pipeline, input, detail, include_intraday).await
    }

    pub fn is_ranking_running(&self) -> bool {
        self.ranking_running.try_lock().is_err()
    }

    /// Claim the single ranking slot; `None` while a pass is running
    pub fn try_claim_ranking(&self) -> Option<RankingClaim> {
        self.ranking_running.clone().try_lock_owned().ok()
    }

    /// Run one ranking pass unless one is already in flight
    ///
    /// Returns `None` when a pass is already running.
    pub async fn run_ranking(&self, windows: &[RankWindow]) -> Result<Option<RankingOutcome>> {
        let Some(claim) = self.try_claim_ranking() else {
            info!("Ranking pass already running, skipping trigger");
            return Ok(None);
        };
        self.run_claimed_ranking(claim, windows).await.map(Some)
    }

    /// Run a pass under an existing claim, then make the new artifacts
    /// visible to lookups
    pub async fn run_claimed_ranking(&self, _claim: RankingClaim, windows: &[RankWindow]) -> Result<RankingOutcome> {
        let outcome = self.ranking_job.run_ranking_pass(windows).await?;
        if let Err(e) = self.rankings.reload().await {
            tracing::warn!(error = %e, "Ranking reload after pass failed, serving previous data");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_quote;
    use crate::services::source::scripted::{daily_series, series_with_gain, ScriptedSource};
    use std::time::Duration;

    fn config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            output_dir: dir.to_path_buf(),
            remote_ranking_url: None,
            holiday_calendar_file: None,
            ranking_concurrency: 4,
            fetch_timeout: Duration::from_secs(10),
            ranking_deadline: Duration::from_secs(600),
            port: 0,
        }
    }

    #[tokio::test]
    async fn test_ranking_pass_feeds_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(
            ScriptedSource::new()
                .with_spot(vec![
                    sample_quote("600001", "Alpha", Some(2.0)),
                    sample_quote("600002", "Beta", Some(-1.0)),
                ])
                .with_history("600001", daily_series(&series_with_gain(60, 0.3)))
                .with_history("600002", daily_series(&series_with_gain(60, 0.1))),
        );
        let services = Services::with_source(config(dir.path()), source).unwrap();

        // Nothing persisted yet
        assert!(services.rankings.get_rank("600001").await.is_err());

        let outcome = services.run_ranking(&[RankWindow::D50]).await.unwrap().unwrap();
        assert_eq!(outcome.ranked, 2);

        let record = services.rankings.get_rank("600001").await.unwrap().unwrap();
        assert_eq!(record.rps_50, Some(100.0));
        assert_eq!(services.rankings.get_top(RankWindow::D50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ranking_claim_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let services = Services::with_source(config(dir.path()), Arc::new(ScriptedSource::new())).unwrap();

        let claim = services.try_claim_ranking().unwrap();
        assert!(services.is_ranking_running());
        assert!(services.try_claim_ranking().is_none());
        assert!(services.run_ranking(&[RankWindow::D50]).await.unwrap().is_none());

        drop(claim);
        assert!(!services.is_ranking_running());
        assert!(services.try_claim_ranking().is_some());
    }

    #[tokio::test]
    async fn test_snapshot_queries() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(ScriptedSource::new().with_spot(vec![
            sample_quote("600001", "Alpha", Some(2.0)),
            sample_quote("000002", "Beta", Some(-1.0)),
        ]));
        let services = Services::with_source(config(dir.path()), source).unwrap();

        let stats = services.market_stats().await.unwrap();
        assert_eq!((stats.total, stats.advancing, stats.declining), (2, 1, 1));
        assert!(!stats.stale);

        assert_eq!(services.search("beta").await.unwrap().len(), 1);

        let movers = services.list_top_movers(Some(Venue::Sz), 5).await.unwrap();
        assert_eq!(movers.value.len(), 1);
        assert_eq!(movers.value[0].code, "000002");
    }
}
