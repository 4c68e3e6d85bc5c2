use super::RankingRecord;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Simple moving averages of close at the fixed windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingAverages {
    pub ma5: f64,
    pub ma10: f64,
    pub ma20: f64,
    pub ma30: f64,
    pub ma60: f64,
    pub ma120: f64,
}

/// One aligned MACD observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdPoint {
    pub date: NaiveDate,
    /// Fast line (EMA12 - EMA26)
    pub dif: f64,
    /// Signal line (EMA9 of dif)
    pub dea: f64,
    /// 2 * (dif - dea)
    pub histogram: f64,
}

/// One bin of the price-residency histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipBucket {
    pub price_low: f64,
    pub price_high: f64,
    /// Fraction of observations closing inside this bin
    pub ratio: f64,
}

/// Trailing extremes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extremes {
    pub high_120: f64,
    pub low_120: f64,
}

/// Cross-sectional strength fields merged from the ranking artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpsFields {
    pub rps_50: Option<f64>,
    pub rps_120: Option<f64>,
    pub rps_250: Option<f64>,
    /// Trading date the ranking was computed for
    pub as_of: Option<String>,
    /// Which artifact source served the ranking (remote / local)
    pub source: String,
}

impl RpsFields {
    pub fn from_record(record: &RankingRecord, source: &str) -> Self {
        Self {
            rps_50: record.rps_50,
            rps_120: record.rps_120,
            rps_250: record.rps_250,
            as_of: Some(record.date.clone()),
            source: source.to_string(),
        }
    }
}

/// Everything the indicator pipeline derives for one symbol
///
/// Built in one pass from daily history and never patched afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub code: String,
    /// Last trading date in the history used
    pub as_of: NaiveDate,
    pub computed_at: DateTime<Utc>,
    pub ma: MovingAverages,
    /// Most recent observations, oldest first
    pub macd: Vec<MacdPoint>,
    pub extremes: Extremes,
    pub chips: Vec<ChipBucket>,
    /// Std/mean of trailing volume; `None` when mean volume is zero
    pub volume_dispersion: Option<f64>,
    /// `None` when the symbol is not in the loaded ranking
    pub rps: Option<RpsFields>,
}
