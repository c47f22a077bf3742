//! Chart data and raw record listing

use super::parse_limit;
use crate::DashboardState;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use speedlog_core::{MeasurementRecord, StoreError, TrendSeries};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    limit: Option<String>,
}

/// Handler for `/api/chart-data` - ascending series for the charts.
pub async fn chart_data_handler(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<TrendSeries>, ApiError> {
    let limit = parse_limit(query.limit.as_deref())?.unwrap_or(state.default_limit);
    let series = state.trends.get_trend_async(limit).await?;
    Ok(Json(series))
}

/// Handler for `/api/results` - stored records, newest first.
pub async fn results_handler(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<MeasurementRecord>>, ApiError> {
    let limit = parse_limit(query.limit.as_deref())?;
    let store = state.runner.store().clone();

    let records = tokio::task::spawn_blocking(move || match limit {
        Some(limit) => store.list_recent(limit),
        None => store.list_all(),
    })
    .await
    .map_err(|e| StoreError::Task(e.to_string()))??;

    Ok(Json(records))
}
