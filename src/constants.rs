//! Tunable constants
//!
//! TTLs, indicator windows and ranking thresholds. Durations are plain
//! seconds so they read the same in logs and in code.

/// Exchange-local timezone for session checks
pub const EXCHANGE_TIMEZONE: &str = "Asia/Shanghai";

/// Continuous trading windows (local time, `HH:MM` inclusive bounds)
pub const MORNING_SESSION: ((u32, u32), (u32, u32)) = ((9, 15), (11, 30));
pub const AFTERNOON_SESSION: ((u32, u32), (u32, u32)) = ((13, 0), (15, 0));

// ---------------------------------------------------------------------------
// Cache TTLs
// ---------------------------------------------------------------------------

/// Full-market snapshot TTL while the market is in session
pub const SNAPSHOT_TTL_TRADING_SECS: u64 = 60;

/// Full-market snapshot TTL outside trading hours (valid until next open)
pub const SNAPSHOT_TTL_CLOSED_SECS: u64 = 43_200;

/// Indicator bundles change slowly intraday
pub const INDICATOR_TTL_SECS: u64 = 300;

/// Intraday bars TTL in session / outside
pub const INTRADAY_TTL_TRADING_SECS: u64 = 30;
pub const INTRADAY_TTL_CLOSED_SECS: u64 = 1_800;

/// How long loaded ranking artifacts are served before a reload attempt
pub const RANKING_TTL_SECS: u64 = 3_600;

/// A failed snapshot or ranking refresh is replayed this long before retrying
pub const FAILED_REFRESH_BACKOFF_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

/// Minimum daily observations required by the indicator pipeline
pub const MIN_INDICATOR_HISTORY: usize = 120;

/// Calendar days of history requested for indicators (~165 sessions)
pub const INDICATOR_HISTORY_CALENDAR_DAYS: i64 = 250;

/// Simple moving average windows on close
pub const MA_WINDOWS: [usize; 6] = [5, 10, 20, 30, 60, 120];

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// Number of most recent MACD observations emitted
pub const MACD_OUTPUT_LEN: usize = 30;

/// Lookback for high/low extremes, chip distribution and volume dispersion
pub const EXTREMES_LOOKBACK: usize = 120;
pub const CHIP_LOOKBACK: usize = 120;
pub const CHIP_BUCKETS: usize = 10;

/// Five-minute bars in one A-share trading day (4 hours)
pub const INTRADAY_BARS: usize = 48;

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Calendar days of history requested per symbol (covers 250 sessions + margin)
pub const RANKING_HISTORY_CALENDAR_DAYS: i64 = 400;

/// Records at or above this percentile rank enter the top set
pub const TOP_RPS_THRESHOLD: f64 = 90.0;

pub const DEFAULT_RANKING_CONCURRENCY: usize = 10;
pub const DEFAULT_RANKING_DEADLINE_SECS: u64 = 1_800;

/// Log batch progress every N completed symbols
pub const RANKING_PROGRESS_EVERY: usize = 100;

pub const FULL_RANKING_FILE: &str = "latest_rps.json";
pub const TOP_RANKING_FILE: &str = "top_rps.json";

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const MAX_FETCH_RETRIES: u32 = 3;

/// Search results are capped
pub const SEARCH_RESULT_LIMIT: usize = 20;
