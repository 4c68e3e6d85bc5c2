use crate::error::Result;
use crate::models::{Ohlcv, Quote};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Upstream market data feed
///
/// Every call is a single network round trip; retries and timeouts are the
/// implementation's concern, caching is the caller's.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Full-market quote table, one row per listed symbol
    async fn fetch_spot_table(&self) -> Result<Vec<Quote>>;

    /// Forward-adjusted daily bars in `[start, end]`, oldest first
    async fn fetch_daily_history(&self, code: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Ohlcv>>;

    /// Five-minute bars of the most recent sessions, oldest first
    async fn fetch_intraday(&self, code: &str) -> Result<Vec<Ohlcv>>;
}

pub type SharedSource = Arc<dyn MarketDataSource>;
