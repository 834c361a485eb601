//! Threshold classification of sensor readings.
//!
//! Every sensor kind owns a [`ThresholdBand`]: a 4-point danger envelope
//! `[d0, d1, d2, d3]`, a 4-point warning envelope `[w0, w1, w2, w3]` and the
//! [`Rule`] that interprets them. Only the inner breakpoints (`d1`, `d2`,
//! `w1`, `w2`) take part in classification; the outer points describe the
//! chartable range.
//!
//! The table is data, loaded from a JSON artifact shared by the monitor and
//! the dashboard. The default artifact is compiled in from
//! `config/thresholds.json` and can be replaced at startup through
//! `THRESHOLDS_PATH`.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SensorKind;

const DEFAULT_TABLE: &str = include_str!("../config/thresholds.json");

// ---

/// Outcome of classifying a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Safe,
    Warning,
    Danger,
}

impl Status {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Safe => "safe",
            Status::Warning => "warning",
            Status::Danger => "danger",
        }
    }
}

/// How a band's breakpoints are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    /// Lower and upper bounds: `value < x1 || value > x2`.
    Band,
    /// Upper bound only: `value > x2`.
    Ceiling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    // ---
    pub rule: Rule,
    pub danger: [f64; 4],
    pub warning: [f64; 4],
}

impl ThresholdBand {
    // ---
    /// Classify a finite value. Comparisons are strict: a value sitting
    /// exactly on a breakpoint belongs to the inner range.
    pub fn classify(&self, value: f64) -> Status {
        // ---
        let outside = |envelope: &[f64; 4]| match self.rule {
            Rule::Band => value < envelope[1] || value > envelope[2],
            Rule::Ceiling => value > envelope[2],
        };

        if outside(&self.danger) {
            Status::Danger
        } else if outside(&self.warning) {
            Status::Warning
        } else {
            Status::Safe
        }
    }

    fn validate(&self, kind: SensorKind) -> Result<(), ThresholdError> {
        // ---
        if self.danger.iter().chain(self.warning.iter()).any(|v| !v.is_finite()) {
            return Err(ThresholdError::NonFinite(kind));
        }
        let [_, d1, d2, _] = self.danger;
        let [_, w1, w2, _] = self.warning;
        let ordered = match self.rule {
            Rule::Band => d1 <= w1 && w1 <= w2 && w2 <= d2,
            Rule::Ceiling => w2 <= d2,
        };
        if ordered {
            Ok(())
        } else {
            Err(ThresholdError::Unordered(kind))
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error("invalid measurement for {kind}: {value} is not a finite number")]
    InvalidMeasurement { kind: SensorKind, value: f64 },
    #[error("no thresholds configured for {0}")]
    Unconfigured(SensorKind),
}

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("thresholds for {0} contain a non-finite breakpoint")]
    NonFinite(SensorKind),
    #[error("thresholds for {0} are not ordered danger <= warning <= warning <= danger")]
    Unordered(SensorKind),
    #[error("thresholds missing for {0}")]
    Missing(SensorKind),
}

/// Per-sensor threshold configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    bands: BTreeMap<SensorKind, ThresholdBand>,
}

impl ThresholdTable {
    // ---
    /// Parse and validate a table from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        // ---
        let table: ThresholdTable =
            serde_json::from_str(json).context("Failed to parse threshold table")?;
        table.validate()?;
        Ok(table)
    }

    /// Load the table from `path`, or the compiled-in default when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // ---
        match path {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read thresholds from {}", path.display()))?;
                let table = Self::from_json(&json)?;
                tracing::info!("Loaded thresholds from {}", path.display());
                Ok(table)
            }
            None => Self::from_json(DEFAULT_TABLE),
        }
    }

    pub fn band(&self, kind: SensorKind) -> Option<&ThresholdBand> {
        self.bands.get(&kind)
    }

    /// Classify `value` for `kind`.
    pub fn classify(&self, kind: SensorKind, value: f64) -> Result<Status, ClassifyError> {
        // ---
        if !value.is_finite() {
            return Err(ClassifyError::InvalidMeasurement { kind, value });
        }
        self.band(kind)
            .map(|band| band.classify(value))
            .ok_or(ClassifyError::Unconfigured(kind))
    }

    fn validate(&self) -> Result<(), ThresholdError> {
        // ---
        for kind in SensorKind::ALL {
            self.bands
                .get(&kind)
                .ok_or(ThresholdError::Missing(kind))?
                .validate(kind)?;
        }
        Ok(())
    }
}
