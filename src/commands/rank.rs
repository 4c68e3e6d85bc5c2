use crate::error::{AppError, Result};
use crate::models::RankWindow;
use crate::services::Services;
use crate::utils::AppConfig;

pub async fn run(config: AppConfig, windows_arg: &str) -> Result<()> {
    let windows = RankWindow::parse_list(windows_arg).map_err(AppError::InvalidInput)?;
    let labels: Vec<String> = windows.iter().map(|w| w.to_string()).collect();
    println!("📊 Ranking windows: {}", labels.join(", "));

    let services = Services::from_config(config)?;
    let Some(outcome) = services.run_ranking(&windows).await? else {
        println!("⏳ A ranking pass is already running");
        return Ok(());
    };

    println!("✅ Ranking pass complete in {:.1}s", outcome.elapsed.as_secs_f64());
    println!("   🌐 Universe:  {}", outcome.universe);
    println!("   📈 Ranked:    {}", outcome.ranked);
    println!("   ❌ Failed:    {}", outcome.failed);
    if outcome.cut_off > 0 {
        println!("   ⏱️  Cut off:   {}", outcome.cut_off);
    }
    println!("   💾 {}", outcome.full_path.display());
    println!("   💾 {}", outcome.top_path.display());

    for window in windows {
        let count = outcome.top.get(window).map_or(0, |r| r.len());
        println!("   🏆 {}: {} symbols", window.top_label(), count);
    }

    Ok(())
}
