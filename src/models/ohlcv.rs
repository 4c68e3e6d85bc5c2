use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Basic OHLCV (Open, High, Low, Close, Volume) bar
///
/// Daily bars carry midnight as their time; intraday bars carry the
/// exchange-local bar end time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    /// Exchange-local bar time
    pub time: NaiveDateTime,

    /// Opening price
    pub open: f64,

    /// Highest price
    pub high: f64,

    /// Lowest price
    pub low: f64,

    /// Closing price
    pub close: f64,

    /// Trading volume in lots
    pub volume: u64,

    /// Turnover in CNY, when the source reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

impl Ohlcv {
    /// Create a new OHLCV bar
    pub fn new(time: NaiveDateTime, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            amount: None,
        }
    }

    /// Create a daily bar for a trading date
    #[cfg(test)]
    pub fn daily(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN), open, high, low, close, volume)
    }

    pub fn date(&self) -> NaiveDate {
        self.time.date()
    }
}

/// Column views over a bar series, oldest first
pub struct SeriesColumns {
    pub closes: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl SeriesColumns {
    pub fn from_bars(bars: &[Ohlcv]) -> Self {
        Self {
            closes: bars.iter().map(|b| b.close).collect(),
            highs: bars.iter().map(|b| b.high).collect(),
            lows: bars.iter().map(|b| b.low).collect(),
            volumes: bars.iter().map(|b| b.volume as f64).collect(),
        }
    }
}
