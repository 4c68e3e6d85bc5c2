use super::source::MarketDataSource;
use crate::constants::{INTRADAY_BARS, MAX_FETCH_RETRIES};
use crate::error::{AppError, Result};
use crate::models::{Ohlcv, Quote, Venue};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

const SPOT_URL: &str = "https://82.push2.eastmoney.com/api/qt/clist/get";
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";

/// Board filter covering Shanghai main/STAR, Shenzhen main/ChiNext and Beijing
const SPOT_BOARDS: &str = "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23,m:0 t:81 s:2048";
const SPOT_FIELDS: &str = "f2,f3,f4,f5,f6,f12,f14,f15,f16,f17,f18";

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Kline period codes
#[derive(Debug, Clone, Copy)]
enum KlinePeriod {
    Daily,
    FiveMinute,
}

impl KlinePeriod {
    fn klt(&self) -> &'static str {
        match self {
            KlinePeriod::Daily => "101",
            KlinePeriod::FiveMinute => "5",
        }
    }
}

/// Client for the Eastmoney public quote API
#[derive(Clone)]
pub struct EastmoneyClient {
    client: reqwest::Client,
    max_retries: u32,
}

impl EastmoneyClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_FETCH_RETRIES,
        })
    }

    fn user_agent() -> &'static str {
        use rand::seq::SliceRandom;
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }

    /// GET a JSON document with retries
    ///
    /// Network errors, 429 and 5xx are retried with exponential backoff plus
    /// jitter. Other 4xx responses fail immediately.
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut last_error: Option<String> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs_f64(2.0_f64.powi(attempt as i32 - 1) + rand::random::<f64>());
                let delay = delay.min(Duration::from_secs(30));
                tracing::info!(
                    "Eastmoney retry backoff: attempt {}/{} - reason: {}, waiting {:.1}s before retry",
                    attempt + 1,
                    self.max_retries,
                    last_error.as_deref().unwrap_or("unknown error"),
                    delay.as_secs_f64()
                );
                sleep(delay).await;
            }

            let response = self
                .client
                .get(url)
                .query(query)
                .header("User-Agent", Self::user_agent())
                .header("Referer", "https://quote.eastmoney.com/")
                .header("Accept", "application/json, text/plain, */*")
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.json::<Value>().await {
                            Ok(data) => return Ok(data),
                            Err(e) => {
                                last_error = Some(format!("JSON parse error: {}", e));
                                continue;
                            }
                        }
                    } else if status.as_u16() == 429 {
                        last_error = Some("Too Many Requests (429) - rate limited".to_string());
                    } else if status.is_client_error() {
                        return Err(AppError::Network(format!(
                            "Client error ({}) from {} - not retryable",
                            status.as_u16(),
                            url
                        )));
                    } else {
                        last_error = Some(format!("HTTP error ({})", status.as_u16()));
                    }
                }
                Err(e) => {
                    last_error = Some(format!("Network error: {}", e));
                }
            }
        }

        Err(AppError::Network(format!(
            "Max retries exceeded for {}: {}",
            url,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    async fn fetch_klines(&self, code: &str, period: KlinePeriod, range: KlineRange) -> Result<Vec<Ohlcv>> {
        let venue = Venue::from_code(code);
        let mut query = vec![
            ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57".to_string()),
            ("klt", period.klt().to_string()),
            ("fqt", "1".to_string()),
            ("secid", format!("{}.{}", venue.market_id(), code)),
        ];
        match range {
            KlineRange::Between(start, end) => {
                query.push(("beg", start.format("%Y%m%d").to_string()));
                query.push(("end", end.format("%Y%m%d").to_string()));
            }
            KlineRange::Latest(limit) => {
                query.push(("end", "20500101".to_string()));
                query.push(("lmt", limit.to_string()));
            }
        }

        tracing::debug!(symbol = %code, period = ?period, "Fetching klines");
        let data = self.get_json(KLINE_URL, &query).await?;
        parse_klines(&data)
    }
}

#[derive(Debug, Clone, Copy)]
enum KlineRange {
    Between(NaiveDate, NaiveDate),
    Latest(usize),
}

#[async_trait]
impl MarketDataSource for EastmoneyClient {
    fn name(&self) -> &str {
        "eastmoney"
    }

    async fn fetch_spot_table(&self) -> Result<Vec<Quote>> {
        let query = [
            ("pn", "1".to_string()),
            ("pz", "50000".to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f3".to_string()),
            ("fs", SPOT_BOARDS.to_string()),
            ("fields", SPOT_FIELDS.to_string()),
        ];
        let data = self.get_json(SPOT_URL, &query).await?;
        parse_spot_table(&data)
    }

    async fn fetch_daily_history(&self, code: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Ohlcv>> {
        self.fetch_klines(code, KlinePeriod::Daily, KlineRange::Between(start, end))
            .await
    }

    async fn fetch_intraday(&self, code: &str) -> Result<Vec<Ohlcv>> {
        self.fetch_klines(code, KlinePeriod::FiveMinute, KlineRange::Latest(INTRADAY_BARS))
            .await
    }
}

/// Numeric cell; `"-"`, empty strings and nulls are missing
fn cell_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn cell_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the `clist/get` response into quote rows
pub fn parse_spot_table(data: &Value) -> Result<Vec<Quote>> {
    let rows: Vec<&Value> = match data.pointer("/data/diff") {
        Some(Value::Array(rows)) => rows.iter().collect(),
        // Some deployments return the rows keyed by index
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(AppError::Parse(format!("Unexpected spot table shape: {}", other)));
        }
    };

    let mut quotes = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(code) = cell_str(row.get("f12")) else {
            continue;
        };
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let name = cell_str(row.get("f14")).unwrap_or_default();

        quotes.push(Quote {
            venue: Venue::from_code(&code),
            code,
            name,
            price: cell_f64(row.get("f2")),
            change_percent: cell_f64(row.get("f3")),
            change_amount: cell_f64(row.get("f4")),
            volume: cell_f64(row.get("f5")).filter(|v| *v >= 0.0).map(|v| v as u64),
            turnover: cell_f64(row.get("f6")),
            high: cell_f64(row.get("f15")),
            low: cell_f64(row.get("f16")),
            open: cell_f64(row.get("f17")),
            prev_close: cell_f64(row.get("f18")),
        });
    }

    Ok(quotes)
}

/// Parse a `kline/get` response
///
/// Rows are `time,open,close,high,low,volume,amount`. A null `data` block
/// (unknown security) yields an empty series.
pub fn parse_klines(data: &Value) -> Result<Vec<Ohlcv>> {
    let klines = match data.pointer("/data/klines") {
        Some(Value::Array(rows)) => rows,
        _ => return Ok(Vec::new()),
    };

    let mut bars = Vec::with_capacity(klines.len());
    for (i, row) in klines.iter().enumerate() {
        let line = row
            .as_str()
            .ok_or_else(|| AppError::Parse(format!("Kline row {} is not a string", i)))?;
        bars.push(parse_kline_row(line)?);
    }

    bars.sort_by(|a, b| a.time.cmp(&b.time));
    Ok(bars)
}

fn parse_kline_row(line: &str) -> Result<Ohlcv> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 6 {
        return Err(AppError::Parse(format!("Malformed kline row '{}'", line)));
    }

    let time = parse_kline_time(parts[0])?;
    let num = |idx: usize| -> Result<f64> {
        parts[idx]
            .trim()
            .parse::<f64>()
            .map_err(|e| AppError::Parse(format!("Bad number '{}' in kline row '{}': {}", parts[idx], line, e)))
    };

    let open = num(1)?;
    let close = num(2)?;
    let high = num(3)?;
    let low = num(4)?;
    let volume = num(5)?.max(0.0) as u64;

    let mut bar = Ohlcv::new(time, open, high, low, close, volume);
    bar.amount = parts.get(6).and_then(|s| s.trim().parse::<f64>().ok());
    Ok(bar)
}

fn parse_kline_time(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(time) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Ok(time);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|e| AppError::Parse(format!("Bad kline time '{}': {}", s, e)))
}
