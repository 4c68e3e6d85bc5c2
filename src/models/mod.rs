mod bundle;
mod ohlcv;
mod ranking;
mod snapshot;
mod symbol;
pub mod indicators;

pub use bundle::{ChipBucket, Extremes, IndicatorBundle, MacdPoint, MovingAverages, RpsFields};
pub use ohlcv::{Ohlcv, SeriesColumns};
pub use ranking::{sort_by_rank_desc, RankWindow, RankingRecord, RankingSet, TopRankingSet};
pub use snapshot::{MarketSnapshot, Quote};
pub use symbol::{normalize_code, Symbol, Venue};

#[cfg(test)]
pub(crate) use snapshot::sample_quote;
