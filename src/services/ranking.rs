//! Cross-sectional momentum ranking
//!
//! One pass fetches daily history for every symbol in the current universe
//! through a bounded pool of concurrent requests, waits for all of them (or
//! the pass deadline), and only then ranks the completed population. The
//! full and top rankings are written atomically to the output directory.

use super::snapshot::SnapshotProvider;
use super::source::SharedSource;
use crate::constants::{
    FULL_RANKING_FILE, RANKING_HISTORY_CALENDAR_DAYS, RANKING_PROGRESS_EVERY, TOP_RANKING_FILE, TOP_RPS_THRESHOLD,
};
use crate::error::{AppError, Result};
use crate::models::indicators::percent_gain;
use crate::models::{sort_by_rank_desc, Ohlcv, RankWindow, RankingRecord, RankingSet, Symbol, TopRankingSet};
use crate::utils::round_to;
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Summary of one ranking pass
#[derive(Debug, Clone)]
pub struct RankingOutcome {
    pub set: RankingSet,
    pub top: TopRankingSet,
    pub universe: usize,
    /// Symbols whose history produced at least one eligible window
    pub ranked: usize,
    /// Fetch errors and timeouts
    pub failed: usize,
    /// Symbols not fetched before the pass deadline
    pub cut_off: usize,
    pub full_path: PathBuf,
    pub top_path: PathBuf,
    pub elapsed: Duration,
}

pub struct RankingJob {
    source: SharedSource,
    snapshots: Arc<SnapshotProvider>,
    output_dir: PathBuf,
    concurrency: usize,
    fetch_timeout: Duration,
    deadline: Duration,
}

impl RankingJob {
    pub fn new(
        source: SharedSource,
        snapshots: Arc<SnapshotProvider>,
        output_dir: impl Into<PathBuf>,
        concurrency: usize,
        fetch_timeout: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            source,
            snapshots,
            output_dir: output_dir.into(),
            concurrency: concurrency.max(1),
            fetch_timeout,
            deadline,
        }
    }

    /// Rank the whole universe over `windows` and persist the result
    #[instrument(skip(self), fields(concurrency = self.concurrency))]
    pub async fn run_ranking_pass(&self, windows: &[RankWindow]) -> Result<RankingOutcome> {
        let started = Instant::now();
        let mut windows = windows.to_vec();
        windows.sort();
        windows.dedup();
        if windows.is_empty() {
            return Err(AppError::InvalidInput("at least one ranking window is required".to_string()));
        }

        let symbols = self.snapshots.symbols().await?;
        let universe = symbols.len();
        let end = self.snapshots.gate().local_date(Utc::now());
        let start = end - ChronoDuration::days(RANKING_HISTORY_CALENDAR_DAYS);
        info!(universe, windows = ?windows, %start, %end, "Starting ranking pass");

        let source = &self.source;
        let fetch_timeout = self.fetch_timeout;
        let fetches = stream::iter(symbols)
            .map(|symbol| async move {
                let result = tokio::time::timeout(
                    fetch_timeout,
                    source.fetch_daily_history(&symbol.code, start, end),
                )
                .await;
                (symbol, result)
            })
            .buffer_unordered(self.concurrency)
            .take_until(tokio::time::sleep(self.deadline));
        let mut fetches = std::pin::pin!(fetches);

        let mut records = Vec::with_capacity(universe);
        let mut completed = 0usize;
        let mut failed = 0usize;

        while let Some((symbol, result)) = fetches.next().await {
            completed += 1;
            match result {
                Ok(Ok(bars)) => {
                    if let Some(record) = record_from_history(&symbol, &bars, &windows) {
                        records.push(record);
                    }
                }
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(symbol = %symbol.code, error = %e, "History fetch failed, excluded from ranking");
                }
                Err(_) => {
                    failed += 1;
                    warn!(symbol = %symbol.code, "History fetch timed out, excluded from ranking");
                }
            }

            if completed % RANKING_PROGRESS_EVERY == 0 {
                info!(
                    completed,
                    universe,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Ranking progress: {:.1}%",
                    completed as f64 / universe.max(1) as f64 * 100.0
                );
            }
        }

        let cut_off = universe - completed;
        if cut_off > 0 {
            warn!(
                cut_off,
                deadline_secs = self.deadline.as_secs(),
                "Ranking deadline reached, unfinished symbols excluded"
            );
        }

        if records.is_empty() {
            return Err(AppError::Unavailable(
                "no symbol produced usable history, previous rankings left in place".to_string(),
            ));
        }

        // Barrier: the population is complete, rank it in one pass
        assign_ranks(&mut records, &windows);
        sort_by_rank_desc(&mut records, RankWindow::D120);

        let set = RankingSet::new(records);
        let top = TopRankingSet::from_ranking(&set, &windows, TOP_RPS_THRESHOLD);
        let (full_path, top_path) = persist_rankings(&self.output_dir, &set, &top).await?;

        let outcome = RankingOutcome {
            ranked: set.len(),
            set,
            top,
            universe,
            failed,
            cut_off,
            full_path,
            top_path,
            elapsed: started.elapsed(),
        };
        info!(
            ranked = outcome.ranked,
            failed = outcome.failed,
            cut_off = outcome.cut_off,
            elapsed_secs = outcome.elapsed.as_secs_f64(),
            "Ranking pass complete"
        );
        Ok(outcome)
    }
}

/// Gains for one symbol; `None` when no window has enough history
pub fn record_from_history(symbol: &Symbol, bars: &[Ohlcv], windows: &[RankWindow]) -> Option<RankingRecord> {
    let last = bars.last()?;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let mut record = RankingRecord::new(
        symbol.code.clone(),
        symbol.name.clone(),
        last.close,
        last.date().format("%Y-%m-%d").to_string(),
    );

    let mut eligible = false;
    for &window in windows {
        let gain = percent_gain(&closes, window.sessions()).filter(|g| g.is_finite());
        eligible |= gain.is_some();
        record.set_gain(window, gain);
    }

    eligible.then_some(record)
}

/// Percentile rank per window over the records eligible for it
///
/// A record's rank is the share of the eligible population whose gain is at
/// or below its own, times 100, rounded to 2 decimals. The top gainer scores
/// 100.0 and the bottom one 100/N. Records without a gain for a window keep
/// no rank for it.
pub fn assign_ranks(records: &mut [RankingRecord], windows: &[RankWindow]) {
    for &window in windows {
        let mut gains: Vec<f64> = records.iter().filter_map(|r| r.gain(window)).collect();
        if gains.is_empty() {
            continue;
        }
        gains.sort_by(f64::total_cmp);
        let population = gains.len() as f64;

        for record in records.iter_mut() {
            if let Some(gain) = record.gain(window) {
                let at_or_below = gains.partition_point(|g| *g <= gain);
                let rps = round_to(at_or_below as f64 / population * 100.0, 2);
                record.set_rank(window, rps, round_to(gain * 100.0, 2));
            }
        }
    }
}

/// Write both artifacts; each file is replaced by rename so readers never
/// see a partial document
pub async fn persist_rankings(dir: &Path, set: &RankingSet, top: &TopRankingSet) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(dir).await?;
    let full_path = write_json_atomic(dir, FULL_RANKING_FILE, set).await?;
    let top_path = write_json_atomic(dir, TOP_RANKING_FILE, top).await?;
    info!(full = %full_path.display(), top = %top_path.display(), "Saved ranking artifacts");
    Ok((full_path, top_path))
}

async fn write_json_atomic<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(file);
    let tmp = dir.join(format!(".{}.tmp", file));
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}
