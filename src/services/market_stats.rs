use crate::constants::SEARCH_RESULT_LIMIT;
use crate::models::{MarketSnapshot, Quote, Symbol, Venue};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// Breadth summary of one market snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketStats {
    pub total: usize,
    pub sh: usize,
    pub sz: usize,
    pub bj: usize,
    pub advancing: usize,
    pub declining: usize,
    /// Zero change, plus rows whose change is unknown (suspended)
    pub flat: usize,
    pub captured_at: DateTime<Utc>,
    pub stale: bool,
}

/// Count symbols per venue and by direction of change
pub fn market_stats(snapshot: &MarketSnapshot, stale: bool) -> MarketStats {
    let mut stats = MarketStats {
        total: snapshot.len(),
        sh: 0,
        sz: 0,
        bj: 0,
        advancing: 0,
        declining: 0,
        flat: 0,
        captured_at: snapshot.captured_at,
        stale,
    };

    for quote in snapshot.quotes() {
        match quote.venue {
            Venue::Sh => stats.sh += 1,
            Venue::Sz => stats.sz += 1,
            Venue::Bj => stats.bj += 1,
        }
        match quote.change_percent {
            Some(p) if p > 0.0 => stats.advancing += 1,
            Some(p) if p < 0.0 => stats.declining += 1,
            _ => stats.flat += 1,
        }
    }

    stats
}

/// Case-insensitive substring match on code or name, in snapshot order
pub fn search(snapshot: &MarketSnapshot, keyword: &str) -> Vec<Symbol> {
    let needle = keyword.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    snapshot
        .quotes()
        .iter()
        .filter(|q| q.code.contains(&needle) || q.name.to_lowercase().contains(&needle))
        .take(SEARCH_RESULT_LIMIT)
        .map(Quote::symbol)
        .collect()
}

/// Snapshot rows by percent change, strongest first
///
/// Rows with unknown change are left out.
pub fn list_top_movers(snapshot: &MarketSnapshot, venue: Option<Venue>, limit: usize) -> Vec<Quote> {
    let mut movers: Vec<&Quote> = snapshot
        .quotes()
        .iter()
        .filter(|q| venue.map_or(true, |v| q.venue == v))
        .filter(|q| q.change_percent.is_some_and(|p| p.is_finite()))
        .collect();

    movers.sort_by(|a, b| {
        let a = a.change_percent.unwrap_or(f64::MIN);
        let b = b.change_percent.unwrap_or(f64::MIN);
        b.partial_cmp(&a).unwrap_or(Ordering::Equal)
    });

    movers.into_iter().take(limit).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_quote;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot::new(
            vec![
                sample_quote("600000", "浦发银行", Some(1.5)),
                sample_quote("600519", "贵州茅台", Some(-0.8)),
                sample_quote("000001", "平安银行", Some(0.0)),
                sample_quote("300750", "宁德时代", Some(4.2)),
                sample_quote("830799", "艾融软件", None),
                sample_quote("920002", "万达轴承", Some(9.9)),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn test_market_stats_counts() {
        let stats = market_stats(&snapshot(), true);
        assert_eq!(stats.total, 6);
        assert_eq!((stats.sh, stats.sz, stats.bj), (2, 2, 2));
        assert_eq!(stats.advancing, 3);
        assert_eq!(stats.declining, 1);
        assert_eq!(stats.flat, 2);
        assert!(stats.stale);
    }

    #[test]
    fn test_search_code_and_name() {
        let snap = snapshot();
        let by_code: Vec<String> = search(&snap, "6005").into_iter().map(|s| s.code).collect();
        assert_eq!(by_code, vec!["600519"]);

        let by_name: Vec<String> = search(&snap, "银行").into_iter().map(|s| s.code).collect();
        assert_eq!(by_name, vec!["600000", "000001"]);

        assert!(search(&snap, "  ").is_empty());
    }

    #[test]
    fn test_search_is_capped() {
        let quotes = (0..50).map(|i| sample_quote(&format!("600{:03}", i), "Bank", Some(0.1))).collect();
        let snap = MarketSnapshot::new(quotes, Utc::now());
        assert_eq!(search(&snap, "bank").len(), SEARCH_RESULT_LIMIT);
    }

    #[test]
    fn test_top_movers_order_and_filter() {
        let snap = snapshot();

        let all: Vec<String> = list_top_movers(&snap, None, 3).into_iter().map(|q| q.code).collect();
        assert_eq!(all, vec!["920002", "300750", "600000"]);

        let sh: Vec<String> = list_top_movers(&snap, Some(Venue::Sh), 10)
            .into_iter()
            .map(|q| q.code)
            .collect();
        assert_eq!(sh, vec!["600000", "600519"]);

        // Unknown change never ranks
        let bj = list_top_movers(&snap, Some(Venue::Bj), 10);
        assert_eq!(bj.len(), 1);
    }
}
