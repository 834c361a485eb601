//! Water-quality monitoring backend.
//!
//! Devices push pH, temperature and TDS readings over HTTP. Every newly
//! created reading is classified against the threshold table by a background
//! [`Monitor`]; readings outside the safe range become stored notifications
//! and push messages on the device topic. The HTTP surface also serves
//! per-device dashboards (latest value, status and trend), monthly analytics
//! and the user/notification directory.
//!
//! Sibling modules talk to each other through the re-exports below so that
//! `routes/*.rs` only ever import from the crate root.

use std::sync::Arc;

use axum::Router;
use chrono::FixedOffset;

pub mod aggregate;
pub mod alerts;
pub mod config;
pub mod dashboard;
pub mod events;
pub mod models;
pub mod monitor;
pub mod predict;
mod routes;
pub mod schema;
pub mod store;
pub mod thresholds;

pub use aggregate::{
    aggregate_month, aggregate_month_in, DailyPoint, MonthlyAggregate, SummaryStats, YearMonth,
};
pub use alerts::{
    Alert, AlertDispatcher, LogPublisher, MemoryPublisher, PushMessage, PushPublisher,
    WebhookPublisher,
};
pub use config::Config;
pub use dashboard::{device_dashboard, DeviceDashboard, SensorCard};
pub use events::{EventBus, SensorEvent};
pub use models::{DeviceReadings, Notification, RawValue, SensorKind, SensorSeries, UserProfile};
pub use monitor::{Monitor, MonitorHandle};
pub use predict::{predict, Prediction, Trend};
pub use store::{MemoryStore, PgStore, ProfileUpdate, Store};
pub use thresholds::{Status, ThresholdTable};

// ---

/// Shared handles every HTTP handler receives.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub thresholds: Arc<ThresholdTable>,
    pub bus: EventBus,
    /// Offset used to bucket readings into calendar days for analytics.
    pub report_offset: FixedOffset,
}

/// Build the complete HTTP application for `state`.
pub fn app(state: AppState) -> Router {
    routes::router(state)
}
