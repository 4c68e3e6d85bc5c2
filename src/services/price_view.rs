use super::cache::{Cached, Freshness};
use super::indicator_pipeline::IndicatorPipeline;
use super::snapshot::SnapshotProvider;
use crate::error::{AppError, Result};
use crate::models::{IndicatorBundle, Ohlcv, Quote};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// An optional section of a composite response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Part<T> {
    Available { freshness: Freshness, data: T },
    Unavailable { kind: &'static str, reason: String },
}

impl<T> Part<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Part::Available { .. })
    }

    fn from_result(result: Result<Cached<T>>) -> Self {
        match result {
            Ok(cached) => Part::Available {
                freshness: cached.freshness,
                data: cached.value,
            },
            Err(e) => Part::Unavailable {
                kind: e.kind(),
                reason: e.to_string(),
            },
        }
    }
}

/// Quote plus the requested optional sections
#[derive(Debug, Clone, Serialize)]
pub struct PriceView {
    pub quote: Quote,
    pub freshness: Freshness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicators: Option<Part<Arc<IndicatorBundle>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intraday: Option<Part<Arc<Vec<Ohlcv>>>>,
}

/// Build the composite view for one symbol
///
/// The quote is mandatory: an unknown symbol or a missing snapshot fails the
/// whole view. Indicator and intraday sections fail independently and only
/// mark themselves unavailable.
pub async fn price_view(
    snapshots: &SnapshotProvider,
    pipeline: &IndicatorPipeline,
    input: &str,
    detail: bool,
    include_intraday: bool,
) -> Result<PriceView> {
    let quote = snapshots.get_quote(input).await?;
    let code = quote.value.code.clone();

    let indicators = async {
        if detail {
            Some(pipeline.compute_indicators(&code).await)
        } else {
            None
        }
    };
    let intraday = async {
        if include_intraday {
            Some(pipeline.get_intraday(&code).await)
        } else {
            None
        }
    };
    let (indicators, intraday) = tokio::join!(indicators, intraday);

    Ok(PriceView {
        quote: quote.value,
        freshness: quote.freshness,
        indicators: indicators.map(|r| section(&code, "indicators", r)),
        intraday: intraday.map(|r| section(&code, "intraday", r)),
    })
}

fn section<T>(code: &str, part: &str, result: Result<Cached<T>>) -> Part<T> {
    if let Err(e) = &result {
        match e {
            AppError::InsufficientData { .. } => {}
            _ => warn!(symbol = %code, part, error = %e, "Optional section unavailable"),
        }
    }
    Part::from_result(result)
}
