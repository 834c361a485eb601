//! Data models shared by the sensor engine, the store and the HTTP routes.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// The water-quality sensors a device can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Ph,
    Temperature,
    Tds,
}

impl SensorKind {
    // ---
    pub const ALL: [SensorKind; 3] = [SensorKind::Ph, SensorKind::Temperature, SensorKind::Tds];

    /// Path segment / wire name of the sensor.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Ph => "ph",
            SensorKind::Temperature => "temperature",
            SensorKind::Tds => "tds",
        }
    }

    /// Human readable label used on dashboard cards.
    pub fn description(&self) -> &'static str {
        match self {
            SensorKind::Ph => "pH Level",
            SensorKind::Temperature => "Temperature",
            SensorKind::Tds => "Total Dissolved Solids",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Ph => "",
            SensorKind::Temperature => "°C",
            SensorKind::Tds => "ppm",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ph" => Ok(SensorKind::Ph),
            "temperature" => Ok(SensorKind::Temperature),
            "tds" => Ok(SensorKind::Tds),
            other => Err(format!("unknown sensor type '{}'", other)),
        }
    }
}

/// A reading value exactly as the device wrote it.
///
/// Devices publish either JSON numbers or numeric strings; both are stored
/// verbatim and only coerced when the engine needs an `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    // ---
    /// Numeric value with malformed or non-finite input coerced to `0`.
    pub fn coerce(&self) -> f64 {
        // ---
        let parsed = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        };
        if parsed.is_finite() {
            parsed
        } else {
            0.0
        }
    }

    /// The value only when the device sent an actual number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }
}

/// Timestamp key -> raw value for one sensor of one device.
pub type SensorSeries = BTreeMap<String, RawValue>;

/// Snapshot of a device's whole sensor subtree.
pub type DeviceReadings = BTreeMap<SensorKind, SensorSeries>;

/// An immutable, already coerced reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    // ---
    pub sensor_kind: SensorKind,
    pub value: f64,
    pub timestamp: String,
}

/// Parse a reading key as an instant.
///
/// Keys are ISO-8601 strings; offset-less keys are taken as UTC.
pub fn parse_timestamp(key: &str) -> Option<DateTime<Utc>> {
    // ---
    if let Ok(ts) = DateTime::parse_from_rfc3339(key) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(key, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Readings of one sensor in chronological order.
///
/// Parsable keys sort by instant; the rest follow in key order.
pub fn chronological(kind: SensorKind, series: &SensorSeries) -> Vec<SensorReading> {
    // ---
    let mut keyed: Vec<(Option<DateTime<Utc>>, &String, &RawValue)> = series
        .iter()
        .map(|(key, raw)| (parse_timestamp(key), key, raw))
        .collect();

    keyed.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(b.1)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(b.1),
    });

    keyed
        .into_iter()
        .map(|(_, key, raw)| SensorReading {
            sensor_kind: kind,
            value: raw.coerce(),
            timestamp: key.clone(),
        })
        .collect()
}

/// Persisted alert record, shaped exactly as the notifications store expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    // ---
    pub id: String,
    pub device_id: String,
    pub title: String,
    pub body: String,
    pub timestamp: String,
    pub read_by: BTreeMap<String, bool>,
}

impl Notification {
    // ---
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.get(user_id).copied().unwrap_or(false)
    }
}

/// Entry of the user/device directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    // ---
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub devices: BTreeMap<String, bool>,
}

impl UserProfile {
    // ---
    pub fn device_ids(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|(_, linked)| **linked)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_sensor_kind_round_trip_names() {
        // ---
        for kind in SensorKind::ALL {
            assert_eq!(kind.as_str().parse::<SensorKind>().unwrap(), kind);
        }
        assert!("humidity".parse::<SensorKind>().is_err());
        assert_eq!(serde_json::to_string(&SensorKind::Tds).unwrap(), "\"tds\"");
    }

    #[test]
    fn test_raw_value_coercion() {
        // ---
        assert_eq!(RawValue::Number(7.2).coerce(), 7.2);
        assert_eq!(RawValue::Text(" 6.8 ".into()).coerce(), 6.8);
        assert_eq!(RawValue::Text("abc".into()).coerce(), 0.0);
        assert_eq!(RawValue::Text("NaN".into()).coerce(), 0.0);
        assert_eq!(RawValue::Text("inf".into()).coerce(), 0.0);
        assert_eq!(RawValue::Text("".into()).coerce(), 0.0);
    }

    #[test]
    fn test_raw_value_deserializes_numbers_and_strings() {
        // ---
        let n: RawValue = serde_json::from_str("12.5").unwrap();
        let s: RawValue = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(n, RawValue::Number(12.5));
        assert_eq!(s, RawValue::Text("12.5".into()));
        assert_eq!(n.as_number(), Some(12.5));
        assert_eq!(s.as_number(), None);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        // ---
        assert!(parse_timestamp("2025-03-05T10:00:00Z").is_some());
        assert!(parse_timestamp("2025-03-05T10:00:00.123+08:00").is_some());
        assert!(parse_timestamp("2025-03-05T10:00:00").is_some());
        assert!(parse_timestamp("2025-03-05 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_chronological_orders_by_instant() {
        // ---
        let mut series = SensorSeries::new();
        // Lexically later, chronologically earlier.
        series.insert("2025-03-05T12:00:00+08:00".into(), RawValue::Number(1.0));
        series.insert("2025-03-05T05:00:00Z".into(), RawValue::Number(2.0));
        series.insert("garbage".into(), RawValue::Number(3.0));

        let values: Vec<f64> = chronological(SensorKind::Ph, &series).iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_notification_wire_shape() {
        // ---
        let mut read_by = BTreeMap::new();
        read_by.insert("u1".to_string(), false);
        let n = Notification {
            id: "notif_1".into(),
            device_id: "dev-1".into(),
            title: "t".into(),
            body: "b".into(),
            timestamp: "2025-01-01T00:00:00.000Z".into(),
            read_by,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["readBy"]["u1"], false);
        assert!(!n.is_read_by("u1"));
        assert!(!n.is_read_by("nobody"));
    }
}
