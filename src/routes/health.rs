//! Liveness probe, plus the number of event bus subscribers so a missing
//! alert monitor shows up as zero.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Live subscribers on the event bus (monitor plus open dashboard streams).
    subscribers: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscribers: state.bus.subscriber_count(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
