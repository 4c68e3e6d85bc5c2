use crate::error::Result;
use crate::services::Services;
use crate::utils::AppConfig;

pub async fn run(config: AppConfig, symbol: &str, detail: bool, intraday: bool) -> Result<()> {
    let services = Services::from_config(config)?;
    let view = services.price_view(symbol, detail, intraday).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
