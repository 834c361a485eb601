//! Monthly aggregation of raw readings into per-day averages for charting.

use std::collections::BTreeMap;

use chrono::{Datelike, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{parse_timestamp, SensorSeries};

// ---

#[derive(Debug, Error, PartialEq)]
pub enum MonthError {
    #[error("month must be between 1 and 12, got {0}")]
    OutOfRange(u32),
    #[error("year {0} is out of range")]
    YearOutOfRange(i32),
}

/// A validated calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    // ---
    pub fn new(year: i32, month: u32) -> Result<Self, MonthError> {
        // ---
        if !(1..=12).contains(&month) {
            return Err(MonthError::OutOfRange(month));
        }
        NaiveDate::from_ymd_opt(year, month, 1).ok_or(MonthError::YearOutOfRange(year))?;
        Ok(YearMonth { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn days_in_month(&self) -> u32 {
        // ---
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        // Both dates exist: the constructor checked the first of this month.
        match (
            NaiveDate::from_ymd_opt(self.year, self.month, 1),
            NaiveDate::from_ymd_opt(next_year, next_month, 1),
        ) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 31,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyPoint {
    // ---
    pub day: u32,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    // ---
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl SummaryStats {
    pub const EMPTY: SummaryStats = SummaryStats {
        min: 0.0,
        max: 0.0,
        avg: 0.0,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAggregate {
    // ---
    pub series: Vec<DailyPoint>,
    pub summary: SummaryStats,
}

/// Aggregate `readings` for `ym`, bucketing days in UTC.
pub fn aggregate_month(readings: &SensorSeries, ym: YearMonth) -> MonthlyAggregate {
    aggregate_month_in(readings, ym, Utc.fix())
}

/// Aggregate `readings` for `ym`, bucketing days in the local time of
/// `offset`.
///
/// Days without readings average to `0` so the chart stays continuous. The
/// summary is taken over every raw value in the month rather than over the
/// day means, and falls back to all zeros for an empty month.
pub fn aggregate_month_in(
    readings: &SensorSeries,
    ym: YearMonth,
    offset: FixedOffset,
) -> MonthlyAggregate {
    // ---
    let mut daily: BTreeMap<u32, Vec<f64>> = BTreeMap::new();

    for (key, raw) in readings {
        let Some(instant) = parse_timestamp(key) else {
            tracing::debug!("Skipping reading with unparsable timestamp '{}'", key);
            continue;
        };
        let local = instant.with_timezone(&offset);
        if local.year() == ym.year() && local.month() == ym.month() {
            daily.entry(local.day()).or_default().push(raw.coerce());
        }
    }

    let series = (1..=ym.days_in_month())
        .map(|day| DailyPoint {
            day,
            average: daily.get(&day).map_or(0.0, |values| mean(values)),
        })
        .collect();

    let all: Vec<f64> = daily.into_values().flatten().collect();

    MonthlyAggregate {
        series,
        summary: summarize(&all),
    }
}

fn mean(values: &[f64]) -> f64 {
    // ---
    if values.is_empty() {
        return 0.0;
    }
    finite_or_zero(values.iter().sum::<f64>() / values.len() as f64)
}

fn summarize(values: &[f64]) -> SummaryStats {
    // ---
    if values.is_empty() {
        return SummaryStats::EMPTY;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    SummaryStats {
        min: finite_or_zero(min),
        max: finite_or_zero(max),
        avg: mean(values),
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
