use crate::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_RANKING_CONCURRENCY, DEFAULT_RANKING_DEADLINE_SECS,
};
use std::path::PathBuf;
use std::time::Duration;

/// Get ranking output directory from environment variable or use default
pub fn get_output_dir() -> PathBuf {
    std::env::var("RPS_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("output"))
}

/// Base URL of the remote copy of the ranking artifacts, if configured
pub fn get_remote_ranking_url() -> Option<String> {
    std::env::var("RPS_REMOTE_BASE_URL")
        .ok()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
}

/// Holiday calendar file (JSON array of YYYY-MM-DD), if configured
pub fn get_holiday_calendar_file() -> Option<PathBuf> {
    std::env::var("HOLIDAY_CALENDAR_FILE").ok().map(PathBuf::from)
}

/// Number of concurrent history fetches during a ranking pass
///
/// Defaults to 10, capped at 4x the CPU count since the work is I/O bound.
pub fn get_ranking_concurrency() -> usize {
    let cap = num_cpus::get().max(1) * 4;
    env_parse("RANKING_CONCURRENCY")
        .unwrap_or(DEFAULT_RANKING_CONCURRENCY)
        .clamp(1, cap.max(DEFAULT_RANKING_CONCURRENCY))
}

pub fn get_fetch_timeout() -> Duration {
    Duration::from_secs(env_parse("FETCH_TIMEOUT_SECS").unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS))
}

pub fn get_ranking_deadline() -> Duration {
    Duration::from_secs(env_parse("RANKING_DEADLINE_SECS").unwrap_or(DEFAULT_RANKING_DEADLINE_SECS))
}

pub fn get_port() -> u16 {
    env_parse("PORT").unwrap_or(8000)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Runtime configuration collected from the environment once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub remote_ranking_url: Option<String>,
    pub holiday_calendar_file: Option<PathBuf>,
    pub ranking_concurrency: usize,
    pub fetch_timeout: Duration,
    pub ranking_deadline: Duration,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            output_dir: get_output_dir(),
            remote_ranking_url: get_remote_ranking_url(),
            holiday_calendar_file: get_holiday_calendar_file(),
            ranking_concurrency: get_ranking_concurrency(),
            fetch_timeout: get_fetch_timeout(),
            ranking_deadline: get_ranking_deadline(),
            port: get_port(),
        }
    }
}
