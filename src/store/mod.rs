//! Persistence boundary for devices, readings, the user directory and
//! notifications.
//!
//! The engine and routes only talk to [`Store`]; [`MemoryStore`] backs tests
//! and database-less deployments, [`PgStore`] keeps everything in PostgreSQL.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DeviceReadings, Notification, RawValue, SensorKind, UserProfile};

pub(crate) mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

/// Fields a user may change on their own profile.
#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---
    /// Register a device so users can link to it. Idempotent.
    async fn provision_device(&self, device_id: &str) -> Result<()>;

    async fn device_exists(&self, device_id: &str) -> Result<bool>;

    /// Write a reading at `device/kind/timestamp`, replacing any previous
    /// value under the same key. Provisions the device on first write.
    ///
    /// Returns `true` when the key did not exist before.
    async fn write_reading(
        &self,
        device_id: &str,
        kind: SensorKind,
        timestamp: &str,
        value: &RawValue,
    ) -> Result<bool>;

    /// Snapshot of every sensor series of a device. Empty for unknown devices.
    async fn device_readings(&self, device_id: &str) -> Result<DeviceReadings>;

    /// Users linked to `device_id`.
    async fn device_users(&self, device_id: &str) -> Result<Vec<String>>;

    /// Insert a user together with both sides of its device links.
    async fn create_user(&self, profile: &UserProfile) -> Result<()>;

    async fn user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Returns `false` when the user does not exist.
    async fn update_user(&self, user_id: &str, update: &ProfileUpdate) -> Result<bool>;

    /// Insert a new notification. Never overwrites: returns `false` and
    /// leaves the stored record alone when the id is already taken.
    async fn insert_notification(&self, notification: &Notification) -> Result<bool>;

    async fn notification(&self, id: &str) -> Result<Option<Notification>>;

    /// Notifications addressed to `user_id`, newest first.
    async fn notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>>;

    /// Set the caller's own `readBy` flag. Only existing recipients can be
    /// flipped; returns `false` for unknown ids and for non-recipients.
    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool>;

    /// Returns `false` for unknown ids.
    async fn delete_notification(&self, id: &str) -> Result<bool>;
}
