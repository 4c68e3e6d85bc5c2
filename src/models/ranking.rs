use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lookback window for gain ranking, in trading sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RankWindow {
    D50,
    D120,
    D250,
}

impl RankWindow {
    pub const ALL: [RankWindow; 3] = [RankWindow::D50, RankWindow::D120, RankWindow::D250];

    pub fn sessions(&self) -> usize {
        match self {
            RankWindow::D50 => 50,
            RankWindow::D120 => 120,
            RankWindow::D250 => 250,
        }
    }

    /// Key of this window in the top-ranking document
    pub fn top_label(&self) -> String {
        format!("top_{}", self.sessions())
    }

    /// Parse from `50`, `top_50` or `rps_50` (case-insensitive)
    pub fn from_str(s: &str) -> Result<Self, String> {
        let lower = s.trim().to_lowercase();
        let days = lower
            .strip_prefix("top_")
            .or_else(|| lower.strip_prefix("rps_"))
            .unwrap_or(&lower);

        match days {
            "50" => Ok(RankWindow::D50),
            "120" => Ok(RankWindow::D120),
            "250" => Ok(RankWindow::D250),
            _ => Err(format!("Invalid window: '{}'. Valid values: 50, 120, 250", s)),
        }
    }

    /// Parse a comma-separated window list, dropping duplicates
    pub fn parse_list(s: &str) -> Result<Vec<Self>, String> {
        let mut windows = Vec::new();
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            let window = Self::from_str(part)?;
            if !windows.contains(&window) {
                windows.push(window);
            }
        }
        if windows.is_empty() {
            return Err("At least one window is required".to_string());
        }
        windows.sort();
        Ok(windows)
    }
}

impl fmt::Display for RankWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sessions())
    }
}

/// Per-symbol ranking row as persisted in the ranking artifacts
///
/// Field names follow the published JSON documents, so files written by
/// earlier runs stay loadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub code: String,
    pub name: String,
    pub close: f64,
    /// Last trading date of the history used (`YYYY-MM-DD`)
    pub date: String,

    /// Raw fractional gains (0.2 means +20%)
    #[serde(default)]
    pub gain_50: Option<f64>,
    #[serde(default)]
    pub gain_120: Option<f64>,
    #[serde(default)]
    pub gain_250: Option<f64>,

    #[serde(rename = "RPS_50", default)]
    pub rps_50: Option<f64>,
    #[serde(rename = "RPS_120", default)]
    pub rps_120: Option<f64>,
    #[serde(rename = "RPS_250", default)]
    pub rps_250: Option<f64>,

    /// Gains in percent, rounded to 2 decimals
    #[serde(default)]
    pub gain_50_pct: Option<f64>,
    #[serde(default)]
    pub gain_120_pct: Option<f64>,
    #[serde(default)]
    pub gain_250_pct: Option<f64>,
}

impl RankingRecord {
    pub fn new(code: impl Into<String>, name: impl Into<String>, close: f64, date: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            close,
            date: date.into(),
            gain_50: None,
            gain_120: None,
            gain_250: None,
            rps_50: None,
            rps_120: None,
            rps_250: None,
            gain_50_pct: None,
            gain_120_pct: None,
            gain_250_pct: None,
        }
    }

    pub fn gain(&self, window: RankWindow) -> Option<f64> {
        match window {
            RankWindow::D50 => self.gain_50,
            RankWindow::D120 => self.gain_120,
            RankWindow::D250 => self.gain_250,
        }
    }

    pub fn set_gain(&mut self, window: RankWindow, gain: Option<f64>) {
        match window {
            RankWindow::D50 => self.gain_50 = gain,
            RankWindow::D120 => self.gain_120 = gain,
            RankWindow::D250 => self.gain_250 = gain,
        }
    }

    pub fn rps(&self, window: RankWindow) -> Option<f64> {
        match window {
            RankWindow::D50 => self.rps_50,
            RankWindow::D120 => self.rps_120,
            RankWindow::D250 => self.rps_250,
        }
    }

    /// Set the percentile rank and the rounded percent gain together
    pub fn set_rank(&mut self, window: RankWindow, rps: f64, gain_pct: f64) {
        match window {
            RankWindow::D50 => {
                self.rps_50 = Some(rps);
                self.gain_50_pct = Some(gain_pct);
            }
            RankWindow::D120 => {
                self.rps_120 = Some(rps);
                self.gain_120_pct = Some(gain_pct);
            }
            RankWindow::D250 => {
                self.rps_250 = Some(rps);
                self.gain_250_pct = Some(gain_pct);
            }
        }
    }
}

/// Orders records by one window's rank, highest first, unranked last
pub fn sort_by_rank_desc(records: &mut [RankingRecord], window: RankWindow) {
    records.sort_by(|a, b| {
        let a = a.rps(window).unwrap_or(-1.0);
        let b = b.rps(window).unwrap_or(-1.0);
        b.total_cmp(&a)
    });
}

/// Full-universe result of one ranking run, persisted as a JSON array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankingSet {
    pub records: Vec<RankingRecord>,
}

impl RankingSet {
    pub fn new(records: Vec<RankingRecord>) -> Self {
        Self { records }
    }

    pub fn find(&self, code: &str) -> Option<&RankingRecord> {
        self.records.iter().find(|r| r.code == code)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-window leaders, persisted as `{"top_50": [...], ...}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopRankingSet {
    pub windows: BTreeMap<String, Vec<RankingRecord>>,
}

impl TopRankingSet {
    /// Keep records whose rank in each window is at least `threshold`
    pub fn from_ranking(set: &RankingSet, windows: &[RankWindow], threshold: f64) -> Self {
        let mut map = BTreeMap::new();
        for &window in windows {
            let mut tops: Vec<RankingRecord> = set
                .records
                .iter()
                .filter(|r| r.rps(window).is_some_and(|rps| rps >= threshold))
                .cloned()
                .collect();
            sort_by_rank_desc(&mut tops, window);
            map.insert(window.top_label(), tops);
        }
        Self { windows: map }
    }

    pub fn get(&self, window: RankWindow) -> Option<&[RankingRecord]> {
        self.windows.get(&window.top_label()).map(Vec::as_slice)
    }
}
