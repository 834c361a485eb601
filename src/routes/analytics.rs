//! Monthly analytics: per-day averages and summary statistics per sensor.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use crate::{aggregate_month_in, AppState, DailyPoint, SensorKind, SummaryStats, YearMonth};

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/devices/{device_id}/analytics", get(handler))
}

/// Query parameters selecting the month to chart.
///
/// Both default to the current month in the reporting offset.
#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    year: Option<i32>,
    /// 1-based calendar month.
    month: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SensorAnalytics {
    data_points: Vec<DailyPoint>,
    summary: SummaryStats,
}

#[derive(Debug, Serialize)]
struct AnalyticsResponse {
    device_id: String,
    year: i32,
    month: u32,
    sensors: BTreeMap<SensorKind, SensorAnalytics>,
}

async fn handler(
    Path(device_id): Path<String>,
    params: Result<Query<AnalyticsQuery>, QueryRejection>,
    State(state): State<AppState>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    // ---
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let today = Utc::now().with_timezone(&state.report_offset);
    let ym = YearMonth::new(
        params.year.unwrap_or(today.year()),
        params.month.unwrap_or(today.month()),
    )
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if !state.store.device_exists(&device_id).await? {
        return Err(ApiError::NotFound("Device not found.".into()));
    }

    info!(
        "GET /devices/{}/analytics - {}-{:02}",
        device_id,
        ym.year(),
        ym.month()
    );

    let mut readings = state.store.device_readings(&device_id).await?;

    // Every sensor is reported, zero-filled when it has no data.
    let sensors = SensorKind::ALL
        .into_iter()
        .map(|kind| {
            let series = readings.remove(&kind).unwrap_or_default();
            let aggregate = aggregate_month_in(&series, ym, state.report_offset);
            (
                kind,
                SensorAnalytics {
                    data_points: aggregate.series,
                    summary: aggregate.summary,
                },
            )
        })
        .collect();

    Ok(Json(AnalyticsResponse {
        device_id,
        year: ym.year(),
        month: ym.month(),
        sensors,
    }))
}
