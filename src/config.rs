//! Configuration loader for the `aquaflow` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Result};
use chrono::FixedOffset;

/// Parse an optional environment variable into `$ty` with a default value.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable, treating blank as unset.
macro_rules! optional_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name).filter(|v: &String| !v.trim().is_empty())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string. Without it readings live in memory.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Threshold table to use instead of the built-in one.
    pub thresholds_path: Option<PathBuf>,

    /// Push gateway endpoint. Without it push messages are only logged.
    pub push_webhook_url: Option<String>,

    /// Events a slow subscriber may fall behind before it starts skipping.
    pub event_bus_capacity: usize,

    /// Offset used to assign readings to calendar days in analytics.
    pub report_offset: FixedOffset,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – PostgreSQL connection string (default: in-memory store)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_ADDR` – bind address (default: `0.0.0.0:8080`)
/// - `THRESHOLDS_PATH` – JSON threshold table (default: built-in)
/// - `PUSH_WEBHOOK_URL` – push gateway URL (default: log only)
/// - `EVENT_BUS_CAPACITY` – per-subscriber event buffer (default: 1024)
/// - `REPORT_UTC_OFFSET_MINUTES` – analytics day boundary offset (default: 0)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    load_with(|name| env::var(name).ok())
}

fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    // ---
    let db_url = optional_env!(lookup, "DATABASE_URL");
    let db_pool_max = parse_env!(lookup, "DB_POOL_MAX", u32, 5);
    let listen_addr = parse_env!(
        lookup,
        "LISTEN_ADDR",
        SocketAddr,
        SocketAddr::from(([0, 0, 0, 0], 8080))
    );
    let thresholds_path = optional_env!(lookup, "THRESHOLDS_PATH").map(PathBuf::from);
    let push_webhook_url = optional_env!(lookup, "PUSH_WEBHOOK_URL");
    let event_bus_capacity = parse_env!(lookup, "EVENT_BUS_CAPACITY", usize, 1024);
    let offset_minutes = parse_env!(lookup, "REPORT_UTC_OFFSET_MINUTES", i32, 0);

    if event_bus_capacity == 0 {
        return Err(anyhow!("Invalid EVENT_BUS_CAPACITY: must be at least 1"));
    }
    let report_offset = offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            anyhow!(
                "Invalid REPORT_UTC_OFFSET_MINUTES: {} is not a valid UTC offset",
                offset_minutes
            )
        })?;

    Ok(Config {
        db_url,
        db_pool_max,
        listen_addr,
        thresholds_path,
        push_webhook_url,
        event_bus_capacity,
        report_offset,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let db_url = self
            .db_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(unset, using in-memory store)".to_string());
        let thresholds = self
            .thresholds_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL       : {}", db_url);
        tracing::info!("  DB_POOL_MAX        : {}", self.db_pool_max);
        tracing::info!("  LISTEN_ADDR        : {}", self.listen_addr);
        tracing::info!("  THRESHOLDS_PATH    : {}", thresholds);
        tracing::info!(
            "  PUSH_WEBHOOK_URL   : {}",
            self.push_webhook_url.as_deref().unwrap_or("(unset, log only)")
        );
        tracing::info!("  EVENT_BUS_CAPACITY : {}", self.event_bus_capacity);
        tracing::info!("  REPORT_UTC_OFFSET  : {}", self.report_offset);
    }
}

/// Mask the password in a connection URL.
fn mask_password(url: &str) -> String {
    // ---
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    // ---
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_with(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        // ---
        let cfg = load(&[]).unwrap();
        assert!(cfg.db_url.is_none());
        assert_eq!(cfg.db_pool_max, 5);
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert!(cfg.thresholds_path.is_none());
        assert!(cfg.push_webhook_url.is_none());
        assert_eq!(cfg.event_bus_capacity, 1024);
        assert_eq!(cfg.report_offset.local_minus_utc(), 0);
    }

    #[test]
    fn test_overrides() {
        // ---
        let cfg = load(&[
            ("DATABASE_URL", "postgres://app:secret@db:5432/aquaflow"),
            ("DB_POOL_MAX", "12"),
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("REPORT_UTC_OFFSET_MINUTES", "480"),
            ("PUSH_WEBHOOK_URL", "  "),
        ])
        .unwrap();
        assert_eq!(cfg.db_pool_max, 12);
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.report_offset.local_minus_utc(), 8 * 3600);
        assert!(cfg.push_webhook_url.is_none());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        // ---
        assert!(load(&[("DB_POOL_MAX", "many")]).is_err());
        assert!(load(&[("EVENT_BUS_CAPACITY", "0")]).is_err());
        assert!(load(&[("REPORT_UTC_OFFSET_MINUTES", "100000")]).is_err());
        assert!(load(&[("LISTEN_ADDR", "nowhere")]).is_err());
    }

    #[test]
    fn test_password_is_masked() {
        // ---
        assert_eq!(
            mask_password("postgres://app:secret@db:5432/aquaflow"),
            "postgres://app:****@db:5432/aquaflow"
        );
        assert_eq!(mask_password("postgres://db/aquaflow"), "postgres://db/aquaflow");
    }
}
