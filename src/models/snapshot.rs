use super::{Symbol, Venue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the full-market quote table
///
/// Numeric cells the upstream reports as missing (suspended symbols, no
/// trade yet today) stay `None`. They are never replaced with zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub venue: Venue,
    pub price: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub prev_close: Option<f64>,
    /// Percent change vs previous close (2.5 means +2.5%)
    pub change_percent: Option<f64>,
    pub change_amount: Option<f64>,
    /// Volume in lots (100 shares)
    pub volume: Option<u64>,
    /// Turnover in CNY
    pub turnover: Option<f64>,
}

impl Quote {
    pub fn symbol(&self) -> Symbol {
        Symbol {
            code: self.code.clone(),
            name: self.name.clone(),
            venue: self.venue,
        }
    }
}

/// The full-market quote table captured at a single instant
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub captured_at: DateTime<Utc>,
    quotes: Vec<Quote>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MarketSnapshot {
    /// Build a snapshot; later duplicates of a code are dropped
    pub fn new(quotes: Vec<Quote>, captured_at: DateTime<Utc>) -> Self {
        let mut index = HashMap::with_capacity(quotes.len());
        let mut unique = Vec::with_capacity(quotes.len());
        for quote in quotes {
            if index.contains_key(&quote.code) {
                continue;
            }
            index.insert(quote.code.clone(), unique.len());
            unique.push(quote);
        }

        Self {
            captured_at,
            quotes: unique,
            index,
        }
    }

    pub fn get(&self, code: &str) -> Option<&Quote> {
        self.index.get(code).map(|&i| &self.quotes[i])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    /// The symbol universe, in upstream order
    pub fn symbols(&self) -> Vec<Symbol> {
        self.quotes.iter().map(Quote::symbol).collect()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_quote(code: &str, name: &str, change_percent: Option<f64>) -> Quote {
    Quote {
        code: code.to_string(),
        name: name.to_string(),
        venue: Venue::from_code(code),
        price: Some(10.0),
        open: Some(9.9),
        high: Some(10.2),
        low: Some(9.8),
        prev_close: Some(9.9),
        change_percent,
        change_amount: change_percent.map(|p| 9.9 * p / 100.0),
        volume: Some(10_000),
        turnover: Some(10_000_000.0),
    }
}
