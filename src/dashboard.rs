//! Dashboard cards: latest value, its status and the short-term trend for
//! every sensor of a device.

use serde::Serialize;

use crate::{
    models::{chronological, DeviceReadings, SensorKind},
    predict::{predict, Prediction},
    thresholds::{Status, ThresholdTable},
};

// ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorCard {
    // ---
    pub sensor: SensorKind,
    pub description: &'static str,
    pub unit: &'static str,
    pub value: f64,
    pub timestamp: String,
    pub status: Status,
    pub prediction: Prediction,
    pub trend_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDashboard {
    pub device_id: String,
    pub sensors: Vec<SensorCard>,
}

/// One card per sensor that has at least one reading.
pub fn build_cards(readings: &DeviceReadings, thresholds: &ThresholdTable) -> Vec<SensorCard> {
    // ---
    readings
        .iter()
        .filter_map(|(kind, series)| {
            let ordered = chronological(*kind, series);
            let latest = ordered.last()?.clone();
            let values: Vec<f64> = ordered.iter().map(|r| r.value).collect();

            let prediction = predict(&values).unwrap_or_else(|e| {
                tracing::warn!("No trend for {}: {}", kind, e);
                Prediction::STABLE
            });
            let status = thresholds.classify(*kind, latest.value).unwrap_or_else(|e| {
                tracing::warn!("No status for {}: {}", kind, e);
                Status::Safe
            });

            Some(SensorCard {
                sensor: *kind,
                description: kind.description(),
                unit: kind.unit(),
                value: latest.value,
                timestamp: latest.timestamp,
                status,
                trend_message: prediction.message(),
                prediction,
            })
        })
        .collect()
}

pub fn device_dashboard(
    device_id: &str,
    readings: &DeviceReadings,
    thresholds: &ThresholdTable,
) -> DeviceDashboard {
    DeviceDashboard {
        device_id: device_id.to_string(),
        sensors: build_cards(readings, thresholds),
    }
}
