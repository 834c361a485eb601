//! Raw sensor data: device provisioning, reading ingest and snapshots.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, info};

use super::error::ApiError;
use crate::{AppState, DeviceReadings, RawValue, SensorEvent, SensorKind};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/devices/{device_id}", put(provision))
        .route("/devices/{device_id}/sensors", get(snapshot))
        .route(
            "/devices/{device_id}/sensors/{sensor}/{timestamp}",
            put(write_reading),
        )
}

#[derive(Debug, Serialize)]
struct WriteResponse {
    device_id: String,
    sensor: SensorKind,
    timestamp: String,
    created: bool,
}

fn parse_sensor(sensor: &str) -> Result<SensorKind, ApiError> {
    sensor.parse::<SensorKind>().map_err(ApiError::BadRequest)
}

async fn provision(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    // ---
    if device_id.trim().is_empty() {
        return Err(ApiError::BadRequest("Device ID cannot be empty.".into()));
    }
    state.store.provision_device(&device_id).await?;
    info!("Provisioned device {}", device_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handle `PUT /devices/{device_id}/sensors/{sensor}/{timestamp}`.
///
/// The body is the raw value, a JSON number or string. Responds `201` for a
/// new key and `200` when an existing key was overwritten; only new keys are
/// evaluated by the alert monitor.
async fn write_reading(
    Path((device_id, sensor, timestamp)): Path<(String, String, String)>,
    State(state): State<AppState>,
    Json(value): Json<RawValue>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let kind = parse_sensor(&sensor)?;
    if timestamp.trim().is_empty() {
        return Err(ApiError::BadRequest("Timestamp cannot be empty.".into()));
    }

    let created = state
        .store
        .write_reading(&device_id, kind, &timestamp, &value)
        .await?;
    debug!(
        "PUT /devices/{}/sensors/{}/{} = {:?} (created: {})",
        device_id, kind, timestamp, value, created
    );

    state.bus.publish(SensorEvent::ReadingWritten {
        device_id: device_id.clone(),
        sensor_kind: kind,
        timestamp: timestamp.clone(),
        value,
        created,
    });

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(WriteResponse {
            device_id,
            sensor: kind,
            timestamp,
            created,
        }),
    ))
}

async fn snapshot(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeviceReadings>, ApiError> {
    // ---
    if !state.store.device_exists(&device_id).await? {
        return Err(ApiError::NotFound("Device not found.".into()));
    }
    Ok(Json(state.store.device_readings(&device_id).await?))
}
