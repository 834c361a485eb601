//! Dashboard cards, one-shot and as a live server-sent event stream.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::{stream, Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::error::ApiError;
use crate::{device_dashboard, AppState, DeviceDashboard, SensorEvent};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/devices/{device_id}/dashboard", get(device))
        .route("/devices/{device_id}/dashboard/stream", get(device_stream))
        .route("/users/{user_id}/dashboard", get(user))
}

async fn load(state: &AppState, device_id: &str) -> Result<DeviceDashboard, ApiError> {
    // ---
    let readings = state.store.device_readings(device_id).await?;
    Ok(device_dashboard(device_id, &readings, &state.thresholds))
}

async fn require_device(state: &AppState, device_id: &str) -> Result<(), ApiError> {
    // ---
    if state.store.device_exists(device_id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound("Device not found.".into()))
    }
}

async fn device(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeviceDashboard>, ApiError> {
    // ---
    require_device(&state, &device_id).await?;
    Ok(Json(load(&state, &device_id).await?))
}

async fn user(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceDashboard>>, ApiError> {
    // ---
    let profile = state
        .store
        .user(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User profile not found.".into()))?;

    let device_ids = profile.device_ids();
    if device_ids.is_empty() {
        return Err(ApiError::NotFound("No devices found for this user.".into()));
    }

    let mut dashboards = Vec::with_capacity(device_ids.len());
    for device_id in device_ids {
        dashboards.push(load(&state, &device_id).await?);
    }
    Ok(Json(dashboards))
}

fn snapshot_event(dashboard: &DeviceDashboard) -> Option<Event> {
    // ---
    Event::default()
        .event("snapshot")
        .json_data(dashboard)
        .map_err(|e| tracing::error!("Failed to encode dashboard snapshot: {}", e))
        .ok()
}

/// Handle `GET /devices/{device_id}/dashboard/stream`.
///
/// Sends the current dashboard on connect, then a fresh one after every
/// reading written for the device. Each snapshot is rebuilt from the store,
/// so a subscriber that lagged behind still converges on the latest state.
async fn device_stream(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // ---
    require_device(&state, &device_id).await?;

    // Subscribe before reading the initial snapshot so no write slips between.
    let updates = BroadcastStream::new(state.bus.subscribe());
    let initial = load(&state, &device_id).await?;
    debug!("Dashboard stream opened for {}", device_id);

    let changes = updates.filter_map(move |received| {
        let state = state.clone();
        let device_id = device_id.clone();
        async move {
            let relevant = match received {
                Ok(SensorEvent::ReadingWritten { device_id: ref d, .. }) => *d == device_id,
                Ok(_) => false,
                // Missed events: resend the current state.
                Err(_) => true,
            };
            if !relevant {
                return None;
            }
            match load(&state, &device_id).await {
                Ok(dashboard) => snapshot_event(&dashboard),
                Err(e) => {
                    tracing::error!("Dashboard refresh for {} failed: {:?}", device_id, e);
                    None
                }
            }
        }
    });

    let events = stream::iter(snapshot_event(&initial))
        .chain(changes)
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
