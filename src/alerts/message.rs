//! Human readable alert text.

use crate::{models::SensorKind, thresholds::Status};

// ---

/// Corrective action for a sensor in a non-safe state.
pub fn recommendation(kind: SensorKind, status: Status) -> Option<&'static str> {
    // ---
    let text = match (kind, status) {
        (_, Status::Safe) => return None,
        (SensorKind::Ph, Status::Danger) => {
            "Adjust pH using buffer solutions for acidity or alkaline-neutralizing agents for high pH."
        }
        (SensorKind::Ph, Status::Warning) => {
            "Monitor pH levels and prepare corrective solutions to stabilize."
        }
        (SensorKind::Tds, Status::Danger) => {
            "Increase TDS by adding minerals or reduce high TDS with water changes and filtration."
        }
        (SensorKind::Tds, Status::Warning) => {
            "Monitor and adjust TDS levels to stabilize within the optimal range."
        }
        (SensorKind::Temperature, Status::Danger) => {
            "Install appropriate heating or cooling systems to stabilize water temperature."
        }
        (SensorKind::Temperature, Status::Warning) => {
            "Monitor trends and activate climate control systems for intervention."
        }
    };
    Some(text)
}

/// Render a reading the way the mobile clients print numbers: plain
/// decimals, switching to exponent form (`1e+21`, `1.5e-7`) below `1e-6`
/// and from `1e21` up.
pub fn format_value(value: f64) -> String {
    // ---
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if !(1e-6..1e21).contains(&magnitude) && value.is_finite() {
        let sci = format!("{:e}", value);
        return match sci.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => sci,
        };
    }
    value.to_string()
}

pub fn title(kind: SensorKind, status: Status) -> Option<String> {
    // ---
    let name = kind.as_str().to_uppercase();
    match status {
        Status::Danger => Some(format!("❗ Critical Alert: {}", name)),
        Status::Warning => Some(format!("⚠️ Warning: {}", name)),
        Status::Safe => None,
    }
}

pub fn body(kind: SensorKind, status: Status, value: f64) -> Option<String> {
    // ---
    let situation = match status {
        Status::Danger => "has exceeded the optimal range",
        Status::Warning => "is approaching the unsafe limit",
        Status::Safe => return None,
    };
    let advice = recommendation(kind, status)?;
    Some(format!(
        "{} level {} at {}.\n\nRecommendation:\n{}",
        kind.as_str().to_uppercase(),
        situation,
        format_value(value),
        advice
    ))
}
