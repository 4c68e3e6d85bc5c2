use super::cache::{Cached, ExpiringCache, StalePolicy};
use super::rps_lookup::RankingLookup;
use super::snapshot::SnapshotProvider;
use super::source::SharedSource;
use crate::constants::{
    CHIP_BUCKETS, CHIP_LOOKBACK, EXTREMES_LOOKBACK, INDICATOR_HISTORY_CALENDAR_DAYS, INDICATOR_TTL_SECS,
    INTRADAY_BARS, INTRADAY_TTL_CLOSED_SECS, INTRADAY_TTL_TRADING_SECS, MACD_FAST, MACD_OUTPUT_LEN, MACD_SIGNAL,
    MACD_SLOW, MA_WINDOWS, MIN_INDICATOR_HISTORY,
};
use crate::error::{AppError, Result};
use crate::models::indicators::{
    calculate_macd, chip_distribution, latest_sma, rolling_extremes, volume_dispersion,
};
use crate::models::{
    normalize_code, Extremes, IndicatorBundle, MacdPoint, MovingAverages, Ohlcv, RpsFields, SeriesColumns,
};
use crate::utils::round_to;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Longest history window served by `get_history`
pub const MAX_HISTORY_DAYS: i64 = 365;

/// Per-symbol computations over daily and intraday history
pub struct IndicatorPipeline {
    source: SharedSource,
    snapshots: Arc<SnapshotProvider>,
    rankings: Arc<RankingLookup>,
    bundles: ExpiringCache<String, Arc<IndicatorBundle>>,
    intraday: ExpiringCache<String, Arc<Vec<Ohlcv>>>,
    fetch_timeout: Duration,
}

impl IndicatorPipeline {
    pub fn new(
        source: SharedSource,
        snapshots: Arc<SnapshotProvider>,
        rankings: Arc<RankingLookup>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            snapshots,
            rankings,
            bundles: ExpiringCache::new("indicators"),
            intraday: ExpiringCache::new("intraday"),
            fetch_timeout,
        }
    }

    /// Normalize `input` and check it against the current universe
    ///
    /// Runs before any per-symbol fetch so unknown symbols never reach the
    /// upstream.
    async fn resolve(&self, input: &str) -> Result<String> {
        let code = normalize_code(input)?;
        let snapshot = self.snapshots.get_snapshot().await?;
        if snapshot.value.contains(&code) {
            Ok(code)
        } else {
            Err(AppError::UnknownSymbol(code))
        }
    }

    async fn fetch_daily(&self, code: &str, calendar_days: i64) -> Result<Vec<Ohlcv>> {
        let end = self.snapshots.gate().local_date(Utc::now());
        let start = end - ChronoDuration::days(calendar_days);
        match tokio::time::timeout(self.fetch_timeout, self.source.fetch_daily_history(code, start, end)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Unavailable(format!("history fetch for {} timed out", code))),
        }
    }

    /// Indicator bundle for one symbol, cached for a few minutes
    #[instrument(skip(self))]
    pub async fn compute_indicators(&self, input: &str) -> Result<Cached<Arc<IndicatorBundle>>> {
        let code = self.resolve(input).await?;

        self.bundles
            .get_or_refresh(code.clone(), StalePolicy::Reject, || async {
                let bars = self.fetch_daily(&code, INDICATOR_HISTORY_CALENDAR_DAYS).await?;
                let rps = self.lookup_rps(&code).await;
                let bundle = build_bundle(&code, &bars, rps, Utc::now())?;
                debug!(symbol = %code, bars = bars.len(), "Computed indicator bundle");
                Ok::<_, AppError>((Arc::new(bundle), Duration::from_secs(INDICATOR_TTL_SECS)))
            })
            .await
    }

    /// Ranking fields for `code`; absence of any ranking data is not an error
    async fn lookup_rps(&self, code: &str) -> Option<RpsFields> {
        match self.rankings.get_loaded().await {
            Ok(loaded) => loaded
                .value
                .get(code)
                .map(|record| RpsFields::from_record(record, &loaded.value.source)),
            Err(e) => {
                warn!(symbol = %code, error = %e, "Ranking data unavailable, bundle has no RPS fields");
                None
            }
        }
    }

    /// Most recent five-minute bars, cached under a session-aware TTL
    pub async fn get_intraday(&self, input: &str) -> Result<Cached<Arc<Vec<Ohlcv>>>> {
        let code = self.resolve(input).await?;

        self.intraday
            .get_or_refresh(code.clone(), StalePolicy::Reject, || async {
                let bars = match tokio::time::timeout(self.fetch_timeout, self.source.fetch_intraday(&code)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(AppError::Unavailable(format!("intraday fetch for {} timed out", code)));
                    }
                };
                if bars.is_empty() {
                    return Err(AppError::Unavailable(format!("no intraday bars for {}", code)));
                }

                let skip = bars.len().saturating_sub(INTRADAY_BARS);
                let recent: Vec<Ohlcv> = bars.into_iter().skip(skip).collect();
                let ttl = self.snapshots.gate().select_ttl(
                    Utc::now(),
                    Duration::from_secs(INTRADAY_TTL_TRADING_SECS),
                    Duration::from_secs(INTRADAY_TTL_CLOSED_SECS),
                );
                Ok::<_, AppError>((Arc::new(recent), ttl))
            })
            .await
    }

    /// Raw daily bars for the last `days` calendar days (1..=365), uncached
    pub async fn get_history(&self, input: &str, days: i64) -> Result<Vec<Ohlcv>> {
        let code = self.resolve(input).await?;
        self.fetch_daily(&code, days.clamp(1, MAX_HISTORY_DAYS)).await
    }
}

/// Derive the full indicator bundle from daily bars, oldest first
///
/// Fewer than the minimum number of bars is an `InsufficientData` error;
/// windows are never shortened to fit.
pub fn build_bundle(
    code: &str,
    bars: &[Ohlcv],
    rps: Option<RpsFields>,
    computed_at: DateTime<Utc>,
) -> Result<IndicatorBundle> {
    let insufficient = || AppError::InsufficientData {
        required: MIN_INDICATOR_HISTORY,
        available: bars.len(),
    };
    let Some(last) = bars.last() else {
        return Err(insufficient());
    };
    if bars.len() < MIN_INDICATOR_HISTORY {
        return Err(insufficient());
    }

    let cols = SeriesColumns::from_bars(bars);

    let sma = |period: usize| latest_sma(&cols.closes, period).map(|v| round_to(v, 3)).ok_or_else(insufficient);
    let [p5, p10, p20, p30, p60, p120] = MA_WINDOWS;
    let ma = MovingAverages {
        ma5: sma(p5)?,
        ma10: sma(p10)?,
        ma20: sma(p20)?,
        ma30: sma(p30)?,
        ma60: sma(p60)?,
        ma120: sma(p120)?,
    };

    let series = calculate_macd(&cols.closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let tail = bars.len().saturating_sub(MACD_OUTPUT_LEN);
    let macd = (tail..bars.len())
        .map(|i| MacdPoint {
            date: bars[i].date(),
            dif: round_to(series.dif[i], 4),
            dea: round_to(series.dea[i], 4),
            histogram: round_to(series.histogram[i], 4),
        })
        .collect();

    let (high_120, low_120) =
        rolling_extremes(&cols.highs, &cols.lows, EXTREMES_LOOKBACK).ok_or_else(insufficient)?;
    let chips = chip_distribution(&cols.closes, CHIP_LOOKBACK, CHIP_BUCKETS).ok_or_else(insufficient)?;
    let volume_dispersion = volume_dispersion(&cols.volumes, CHIP_LOOKBACK).map(|v| round_to(v, 4));

    Ok(IndicatorBundle {
        code: code.to_string(),
        as_of: last.date(),
        computed_at,
        ma,
        macd,
        extremes: Extremes { high_120, low_120 },
        chips,
        volume_dispersion,
        rps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample_quote, RankWindow, RankingRecord, RankingSet, TopRankingSet};
    use crate::services::rps_lookup::RankingSource;
    use crate::services::source::scripted::{daily_series, ScriptedSource};
    use crate::services::trading_hours::SessionGate;
    use async_trait::async_trait;

    struct FixedRankings(RankingSet);

    #[async_trait]
    impl RankingSource for FixedRankings {
        fn name(&self) -> &str {
            "local"
        }

        async fn load_full(&self) -> Result<RankingSet> {
            Ok(self.0.clone())
        }

        async fn load_top(&self) -> Result<TopRankingSet> {
            Ok(TopRankingSet::default())
        }
    }

    fn closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + (i as f64 * 0.3).sin() + i as f64 * 0.01).collect()
    }

    fn pipeline(source: Arc<ScriptedSource>, rankings: RankingSet) -> IndicatorPipeline {
        let gate = Arc::new(SessionGate::new(None));
        let snapshots = Arc::new(SnapshotProvider::new(source.clone(), gate, Duration::from_secs(10)));
        let ranking_sources: Vec<Arc<dyn RankingSource>> = vec![Arc::new(FixedRankings(rankings))];
        let lookup = Arc::new(RankingLookup::new(ranking_sources));
        IndicatorPipeline::new(source, snapshots, lookup, Duration::from_secs(10))
    }

    fn universe() -> Vec<crate::models::Quote> {
        vec![
            sample_quote("600000", "浦发银行", Some(1.0)),
            sample_quote("000001", "平安银行", Some(-1.0)),
        ]
    }

    #[test]
    fn test_build_bundle_shapes() {
        let bars = daily_series(&closes(160));
        let bundle = build_bundle("600000", &bars, None, Utc::now()).unwrap();

        assert_eq!(bundle.as_of, bars.last().unwrap().date());
        assert_eq!(bundle.macd.len(), MACD_OUTPUT_LEN);
        assert_eq!(bundle.macd.last().unwrap().date, bundle.as_of);
        assert_eq!(bundle.chips.len(), CHIP_BUCKETS);

        let chip_sum: f64 = bundle.chips.iter().map(|c| c.ratio).sum();
        assert!((chip_sum - 1.0).abs() < 0.001);

        for point in &bundle.macd {
            assert!((point.histogram - 2.0 * (point.dif - point.dea)).abs() < 1e-3);
        }

        let window = &bars[bars.len() - 120..];
        let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        assert_eq!(bundle.extremes.high_120, high);
        assert!(bundle.extremes.low_120 <= bundle.ma.ma120);
        assert!(bundle.volume_dispersion.is_some());
    }

    #[test]
    fn test_build_bundle_moving_averages() {
        let flat: Vec<f64> = vec![20.0; 120];
        let bundle = build_bundle("600000", &daily_series(&flat), None, Utc::now()).unwrap();
        assert_eq!(bundle.ma.ma5, 20.0);
        assert_eq!(bundle.ma.ma120, 20.0);
    }

    #[test]
    fn test_eighty_days_is_insufficient() {
        let bars = daily_series(&closes(80));
        let err = build_bundle("600000", &bars, None, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientData {
                required: 120,
                available: 80
            }
        ));
    }

    #[tokio::test]
    async fn test_pipeline_reports_insufficient_history() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_spot(universe())
                .with_history("600000", daily_series(&closes(80))),
        );
        let pipeline = pipeline(source, RankingSet::default());

        let result = pipeline.compute_indicators("600000").await;
        assert!(matches!(result, Err(AppError::InsufficientData { available: 80, .. })));
    }

    #[tokio::test]
    async fn test_unknown_symbol_rejected_before_fetch() {
        let source = Arc::new(ScriptedSource::new().with_spot(universe()));
        let pipeline = pipeline(source.clone(), RankingSet::default());

        assert!(matches!(
            pipeline.compute_indicators("300750").await,
            Err(AppError::UnknownSymbol(_))
        ));
        assert!(matches!(
            pipeline.compute_indicators("not-a-code").await,
            Err(AppError::UnknownSymbol(_))
        ));
        assert!(matches!(pipeline.get_intraday("300750").await, Err(AppError::UnknownSymbol(_))));
        assert_eq!(source.history_calls(), 0);
        assert_eq!(source.intraday_calls(), 0);
    }

    #[tokio::test]
    async fn test_bundle_cached_and_merges_rps() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_spot(universe())
                .with_history("600000", daily_series(&closes(150))),
        );
        let mut record = RankingRecord::new("600000", "浦发银行", 10.0, "2024-06-28");
        record.set_rank(RankWindow::D120, 97.5, 35.0);
        let pipeline = pipeline(source.clone(), RankingSet::new(vec![record]));

        let first = pipeline.compute_indicators("600000").await.unwrap();
        let second = pipeline.compute_indicators("sh600000").await.unwrap();

        assert!(Arc::ptr_eq(&first.value, &second.value));
        assert_eq!(source.history_calls(), 1);

        let rps = first.value.rps.as_ref().unwrap();
        assert_eq!(rps.rps_120, Some(97.5));
        assert_eq!(rps.rps_50, None);
        assert_eq!(rps.source, "local");
    }

    #[tokio::test]
    async fn test_symbol_missing_from_ranking_has_no_rps() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_spot(universe())
                .with_history("000001", daily_series(&closes(130))),
        );
        let pipeline = pipeline(source, RankingSet::default());

        let bundle = pipeline.compute_indicators("000001").await.unwrap();
        assert!(bundle.value.rps.is_none());
    }

    #[tokio::test]
    async fn test_history_failure_is_not_cached() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_spot(universe())
                .with_failure("600000"),
        );
        let pipeline = pipeline(source.clone(), RankingSet::default());

        assert!(matches!(pipeline.compute_indicators("600000").await, Err(AppError::Network(_))));
        assert!(pipeline.compute_indicators("600000").await.is_err());
        assert_eq!(source.history_calls(), 2);
    }

    #[tokio::test]
    async fn test_intraday_keeps_latest_bars() {
        let bars: Vec<Ohlcv> = daily_series(&closes(60));
        let source = Arc::new(
            ScriptedSource::new()
                .with_spot(universe())
                .with_intraday("600000", bars.clone()),
        );
        let pipeline = pipeline(source.clone(), RankingSet::default());

        let intraday = pipeline.get_intraday("600000").await.unwrap();
        assert_eq!(intraday.value.len(), INTRADAY_BARS);
        assert_eq!(intraday.value.last(), bars.last());

        pipeline.get_intraday("600000").await.unwrap();
        assert_eq!(source.intraday_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_intraday_is_unavailable() {
        let source = Arc::new(ScriptedSource::new().with_spot(universe()));
        let pipeline = pipeline(source, RankingSet::default());
        assert!(matches!(pipeline.get_intraday("000001").await, Err(AppError::Unavailable(_))));
    }
}
