use crate::error::Result;
use crate::server;
use crate::services::Services;
use crate::utils::AppConfig;
use std::sync::Arc;

pub async fn run(config: AppConfig) -> Result<()> {
    let port = config.port;
    println!("🚀 Starting ashare-rps server on port {}", port);
    println!("📁 Ranking output directory: {}", config.output_dir.display());
    if let Some(url) = &config.remote_ranking_url {
        println!("🌐 Remote rankings: {}", url);
    }

    let services = Arc::new(Services::from_config(config)?);

    // Warm the snapshot so the first request does not pay for the full table
    match services.snapshots.get_snapshot().await {
        Ok(snapshot) => println!("📈 Market snapshot loaded: {} symbols", snapshot.value.len()),
        Err(e) => eprintln!("⚠️  Warning: initial snapshot failed: {}", e),
    }

    server::serve(services, port).await
}
