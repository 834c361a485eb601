//! Short-term trend prediction from the two most recent readings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increase,
    Decrease,
    Stable,
}

impl Trend {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Increase => "increase",
            Trend::Decrease => "decrease",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    // ---
    pub percent_change: f64,
    pub trend: Trend,
}

impl Prediction {
    // ---
    pub const STABLE: Prediction = Prediction {
        percent_change: 0.0,
        trend: Trend::Stable,
    };

    /// Sentence shown under a dashboard card.
    pub fn message(&self) -> String {
        // ---
        match self.trend {
            Trend::Stable => "Expected to be stable".to_string(),
            trend => format!(
                "Expected to {} by {:.1}%",
                trend.as_str(),
                self.percent_change.abs()
            ),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PredictError {
    /// The previous reading is zero, so a relative change is undefined.
    #[error("cannot compute a relative change from a zero baseline")]
    InvalidBaseline,
    #[error("reading {0} is not a finite number")]
    InvalidMeasurement(f64),
}

/// Predict the trend of a chronologically ordered series.
///
/// Only the last two samples are considered. Fewer than two samples yield a
/// stable prediction with no change.
pub fn predict(values: &[f64]) -> Result<Prediction, PredictError> {
    // ---
    let [prev, last] = match values {
        [.., prev, last] => [*prev, *last],
        _ => return Ok(Prediction::STABLE),
    };

    if let Some(bad) = [prev, last].into_iter().find(|v| !v.is_finite()) {
        return Err(PredictError::InvalidMeasurement(bad));
    }
    if prev == 0.0 {
        return Err(PredictError::InvalidBaseline);
    }

    let percent_change = (last - prev) / prev * 100.0;
    let trend = if percent_change > 0.0 {
        Trend::Increase
    } else if percent_change < 0.0 {
        Trend::Decrease
    } else {
        Trend::Stable
    };

    Ok(Prediction {
        percent_change,
        trend,
    })
}
