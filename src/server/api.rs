use crate::error::AppError;
use crate::models::{RankWindow, Venue};
use crate::server::AppState;
use crate::services::MAX_HISTORY_DAYS;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const DEFAULT_HISTORY_DAYS: i64 = 30;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Success envelope: `{"status": "success", "data": ..., "timestamp": ...}`
fn success<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "success",
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

/// HTTP status for each error kind
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::UnknownSymbol(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Unavailable(_) | AppError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Config(_) | AppError::Io(_) | AppError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error envelope: `{"status": "error", "error": ..., "kind": ...}`
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, status = status.as_u16(), "Request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (
            status,
            Json(serde_json::json!({
                "status": "error",
                "error": self.0.to_string(),
                "kind": self.0.kind(),
            })),
        )
            .into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: String,
}

/// GET /api/stock/info?symbol=600000 - One row of the current snapshot
#[instrument(skip(state))]
pub async fn stock_info_handler(State(state): State<AppState>, Query(params): Query<SymbolQuery>) -> ApiResult {
    let quote = state.services.snapshots.get_quote(&params.symbol).await?;
    Ok(success(serde_json::json!({
        "quote": quote.value,
        "freshness": quote.freshness,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub symbol: String,
    /// Include the indicator bundle
    #[serde(default = "default_detail")]
    pub detail: bool,
    /// Include the latest five-minute bars
    #[serde(default)]
    pub intraday: bool,
}

fn default_detail() -> bool {
    true
}

/// GET /api/stock/price?symbol=600000&detail=true&intraday=true
#[instrument(skip(state))]
pub async fn stock_price_handler(State(state): State<AppState>, Query(params): Query<PriceQuery>) -> ApiResult {
    let view = state
        .services
        .price_view(&params.symbol, params.detail, params.intraday)
        .await?;
    Ok(success(view))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub symbol: String,
    pub days: Option<i64>,
}

/// GET /api/stock/historical?symbol=600000&days=90 - Raw daily bars
#[instrument(skip(state))]
pub async fn stock_history_handler(State(state): State<AppState>, Query(params): Query<HistoryQuery>) -> ApiResult {
    let days = params.days.unwrap_or(DEFAULT_HISTORY_DAYS).clamp(1, MAX_HISTORY_DAYS);
    let bars = state.services.pipeline.get_history(&params.symbol, days).await?;
    Ok(success(serde_json::json!({
        "symbol": params.symbol.trim(),
        "days": days,
        "bars": bars,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub venue: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/stock/list?venue=sh&limit=50 - Top movers by percent change
#[instrument(skip(state))]
pub async fn stock_list_handler(State(state): State<AppState>, Query(params): Query<ListQuery>) -> ApiResult {
    let venue = params
        .venue
        .as_deref()
        .map(Venue::from_str)
        .transpose()
        .map_err(AppError::InvalidInput)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

    let movers = state.services.list_top_movers(venue, limit).await?;
    Ok(success(serde_json::json!({
        "quotes": movers.value,
        "freshness": movers.freshness,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
}

/// GET /api/stock/search?keyword=银行
#[instrument(skip(state))]
pub async fn stock_search_handler(State(state): State<AppState>, Query(params): Query<SearchQuery>) -> ApiResult {
    if params.keyword.trim().is_empty() {
        return Err(AppError::InvalidInput("keyword must not be empty".to_string()).into());
    }
    Ok(success(state.services.search(&params.keyword).await?))
}

/// GET /api/market/stats - Breadth of the current snapshot
#[instrument(skip(state))]
pub async fn market_stats_handler(State(state): State<AppState>) -> ApiResult {
    Ok(success(state.services.market_stats().await?))
}

/// GET /api/rps/{code} - Ranking record for one symbol
#[instrument(skip(state))]
pub async fn rps_handler(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult {
    match state.services.rankings.get_rank(&code).await? {
        Some(record) => Ok(success(record)),
        None => Err(AppError::NotFound(format!("no ranking record for {}", code.trim())).into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

/// GET /api/rps/top/{window}?limit=20 - Top ranked symbols for a window
#[instrument(skip(state))]
pub async fn rps_top_handler(
    State(state): State<AppState>,
    Path(window): Path<String>,
    Query(params): Query<TopQuery>,
) -> ApiResult {
    let window = RankWindow::from_str(&window).map_err(AppError::InvalidInput)?;
    let mut records = state.services.rankings.get_top(window).await?;
    if let Some(limit) = params.limit {
        records.truncate(limit);
    }
    Ok(success(serde_json::json!({
        "window": window.top_label(),
        "records": records,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    /// Comma-separated windows, all by default
    pub windows: Option<String>,
}

/// POST /api/rps/trigger - Start a ranking pass in the background
#[instrument(skip(state))]
pub async fn rps_trigger_handler(State(state): State<AppState>, Query(params): Query<TriggerQuery>) -> ApiResult {
    let windows = match params.windows.as_deref() {
        Some(list) => RankWindow::parse_list(list).map_err(AppError::InvalidInput)?,
        None => RankWindow::ALL.to_vec(),
    };

    let Some(claim) = state.services.try_claim_ranking() else {
        return Ok((
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "error",
                "error": "a ranking pass is already running",
                "kind": "conflict",
            })),
        )
            .into_response());
    };

    let services = state.services.clone();
    let labels: Vec<String> = windows.iter().map(|w| w.top_label()).collect();
    tokio::spawn(async move {
        match services.run_claimed_ranking(claim, &windows).await {
            Ok(outcome) => info!(ranked = outcome.ranked, "Triggered ranking pass finished"),
            Err(e) => warn!(error = %e, "Triggered ranking pass failed"),
        }
    });

    info!(windows = ?labels, "Ranking pass triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "success",
            "data": { "started": true, "windows": labels },
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
        .into_response())
}

/// GET /api/health
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let gate = state.services.snapshots.gate();
    success(serde_json::json!({
        "timezone": gate.timezone_name(),
        "trading_session": gate.is_trading_session(now),
        "holiday_calendar": gate.has_calendar(),
        "ranking_running": state.services.is_ranking_running(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "current_system_time": now.to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::source::scripted::ScriptedSource;
    use crate::services::Services;
    use crate::utils::AppConfig;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn state(dir: &std::path::Path) -> AppState {
        let config = AppConfig {
            output_dir: dir.to_path_buf(),
            remote_ranking_url: None,
            holiday_calendar_file: None,
            ranking_concurrency: 2,
            fetch_timeout: Duration::from_secs(10),
            ranking_deadline: Duration::from_secs(60),
            port: 0,
        };
        let services = Services::with_source(config, Arc::new(ScriptedSource::new())).unwrap();
        AppState {
            services: Arc::new(services),
            started_at: Instant::now(),
        }
    }

    fn query<T: serde::de::DeserializeOwned>(uri: &str) -> T {
        let uri: axum::http::Uri = uri.parse().unwrap();
        Query::<T>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_price_query_defaults_to_detail() {
        let params: PriceQuery = query("http://localhost/api/stock/price?symbol=600000");
        assert!(params.detail);
        assert!(!params.intraday);

        let params: PriceQuery = query("http://localhost/api/stock/price?symbol=600000&detail=false");
        assert!(!params.detail);
    }

    #[tokio::test]
    async fn test_second_trigger_conflicts_while_pass_runs() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let first = rps_trigger_handler(State(state.clone()), Query(TriggerQuery { windows: None }))
            .await
            .into_response();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        // The spawned pass still holds its claim
        let second = rps_trigger_handler(State(state.clone()), Query(TriggerQuery { windows: None }))
            .await
            .into_response();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_trigger_rejects_bad_windows() {
        let dir = tempfile::tempdir().unwrap();
        let response = rps_trigger_handler(
            State(state(dir.path())),
            Query(TriggerQuery {
                windows: Some("7".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AppError::UnknownSymbol("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AppError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&AppError::InsufficientData {
                required: 120,
                available: 80
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&AppError::Unavailable("x".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&AppError::Network("x".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&AppError::Io("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_status() {
        let response = ApiError::from(AppError::UnknownSymbol("999999".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = success(serde_json::json!({"ok": true}));
        assert_eq!(response.status(), StatusCode::OK);
    }
}
