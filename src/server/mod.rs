pub mod api;

use crate::error::Result;
use crate::services::SharedServices;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub services: SharedServices,
    pub started_at: Instant,
}

/// Install the global tracing subscriber: `info` unless `RUST_LOG` says otherwise
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api::health_handler))
        .route("/api/stock/info", get(api::stock_info_handler))
        .route("/api/stock/price", get(api::stock_price_handler))
        .route("/api/stock/historical", get(api::stock_history_handler))
        .route("/api/stock/list", get(api::stock_list_handler))
        .route("/api/stock/search", get(api::stock_search_handler))
        .route("/api/market/stats", get(api::market_stats_handler))
        .route("/api/rps/trigger", post(api::rps_trigger_handler))
        .route("/api/rps/top/{window}", get(api::rps_top_handler))
        .route("/api/rps/{code}", get(api::rps_handler))
        .layer(cors)
        .with_state(state)
}

/// Start the axum server
pub async fn serve(services: SharedServices, port: u16) -> Result<()> {
    tracing::info!("Starting ashare-rps server");

    let app = router(AppState {
        services,
        started_at: Instant::now(),
    });

    tracing::info!("Registering routes:");
    tracing::info!("  GET  /api/stock/info?symbol=600000");
    tracing::info!("  GET  /api/stock/price?symbol=600000&detail=true&intraday=true");
    tracing::info!("  GET  /api/stock/historical?symbol=600000&days=30");
    tracing::info!("  GET  /api/stock/list?venue=sh&limit=50");
    tracing::info!("  GET  /api/stock/search?keyword=银行");
    tracing::info!("  GET  /api/market/stats");
    tracing::info!("  GET  /api/rps/{{code}}");
    tracing::info!("  GET  /api/rps/top/{{window}}");
    tracing::info!("  POST /api/rps/trigger?windows=50,120,250");
    tracing::info!("  GET  /api/health");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
