use crate::error::{AppError, Result};
use crate::models::RankWindow;
use crate::services::Services;
use crate::utils::AppConfig;

/// Print the ranking record for one symbol
pub async fn run(config: AppConfig, symbol: &str) -> Result<()> {
    let services = Services::from_config(config)?;
    match services.rankings.get_rank(symbol).await? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => Err(AppError::NotFound(format!("no ranking record for {}", symbol.trim()))),
    }
}

/// Print the top set for one window
pub async fn top(config: AppConfig, window_arg: &str, limit: usize) -> Result<()> {
    let window = RankWindow::from_str(window_arg).map_err(AppError::InvalidInput)?;
    let services = Services::from_config(config)?;
    let records = services.rankings.get_top(window).await?;

    println!("🏆 {} ({} symbols)\n", window.top_label(), records.len());
    println!("{:<8} {:<12} {:>10} {:>10} {:>10}", "code", "name", "close", "rps", "gain%");
    for record in records.iter().take(limit) {
        println!(
            "{:<8} {:<12} {:>10.2} {:>10} {:>10}",
            record.code,
            record.name,
            record.close,
            fmt_opt(record.rps(window)),
            fmt_opt(window_gain_pct(record, window)),
        );
    }
    Ok(())
}

fn window_gain_pct(record: &crate::models::RankingRecord, window: RankWindow) -> Option<f64> {
    match window {
        RankWindow::D50 => record.gain_50_pct,
        RankWindow::D120 => record.gain_120_pct,
        RankWindow::D250 => record.gain_250_pct,
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}
