use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};

use super::{ProfileUpdate, Store};
use crate::models::{DeviceReadings, Notification, RawValue, SensorKind, UserProfile};

// ---

/// PostgreSQL-backed store. Expects the tables created by
/// [`crate::schema::create_schema`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    sensor_kind: String,
    ts_key: String,
    value: Json<RawValue>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: String,
    username: String,
    email: String,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    notification_id: String,
    device_id: String,
    title: String,
    body: String,
    timestamp: String,
    read_by: Json<BTreeMap<String, bool>>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.notification_id,
            device_id: row.device_id,
            title: row.title,
            body: row.body,
            timestamp: row.timestamp,
            read_by: row.read_by.0,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    // ---
    async fn provision_device(&self, device_id: &str) -> Result<()> {
        // ---
        sqlx::query("INSERT INTO devices (device_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn device_exists(&self, device_id: &str) -> Result<bool> {
        // ---
        let found: Option<(String,)> =
            sqlx::query_as("SELECT device_id FROM devices WHERE device_id = $1")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn write_reading(
        &self,
        device_id: &str,
        kind: SensorKind,
        timestamp: &str,
        value: &RawValue,
    ) -> Result<bool> {
        // ---
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO devices (device_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(device_id)
            .execute(&mut *tx)
            .await?;

        // xmax is zero only for freshly inserted tuples.
        let (inserted,): (bool,) = sqlx::query_as(
            r#"
            INSERT INTO sensor_readings (device_id, sensor_kind, ts_key, value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (device_id, sensor_kind, ts_key) DO UPDATE SET
                value = EXCLUDED.value
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(device_id)
        .bind(kind.as_str())
        .bind(timestamp)
        .bind(Json(value))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn device_readings(&self, device_id: &str) -> Result<DeviceReadings> {
        // ---
        let rows: Vec<ReadingRow> = sqlx::query_as(
            "SELECT sensor_kind, ts_key, value FROM sensor_readings WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        let mut readings = DeviceReadings::new();
        for row in rows {
            match row.sensor_kind.parse::<SensorKind>() {
                Ok(kind) => {
                    readings
                        .entry(kind)
                        .or_default()
                        .insert(row.ts_key, row.value.0);
                }
                Err(e) => tracing::warn!("Ignoring stored reading for {}: {}", device_id, e),
            }
        }
        Ok(readings)
    }

    async fn device_users(&self, device_id: &str) -> Result<Vec<String>> {
        // ---
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM device_users WHERE device_id = $1 ORDER BY user_id",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn create_user(&self, profile: &UserProfile) -> Result<()> {
        // ---
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (user_id, username, email) VALUES ($1, $2, $3)")
            .bind(&profile.user_id)
            .bind(&profile.username)
            .bind(&profile.email)
            .execute(&mut *tx)
            .await?;

        for device_id in profile.device_ids() {
            sqlx::query(
                "INSERT INTO device_users (device_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(&device_id)
            .bind(&profile.user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        // ---
        let row: Option<UserRow> =
            sqlx::query_as("SELECT user_id, username, email FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let devices: Vec<(String,)> =
            sqlx::query_as("SELECT device_id FROM device_users WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(UserProfile {
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            devices: devices.into_iter().map(|(id,)| (id, true)).collect(),
        }))
    }

    async fn update_user(&self, user_id: &str, update: &ProfileUpdate) -> Result<bool> {
        // ---
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                email    = COALESCE($3, email)
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(update.username.as_deref())
        .bind(update.email.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<bool> {
        // ---
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (
                notification_id, device_id, title, body, timestamp, read_by
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (notification_id) DO NOTHING
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.device_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.timestamp)
        .bind(Json(&notification.read_by))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn notification(&self, id: &str) -> Result<Option<Notification>> {
        // ---
        let row: Option<NotificationRow> = sqlx::query_as(
            r#"
            SELECT notification_id, device_id, title, body, timestamp, read_by
            FROM notifications WHERE notification_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Notification::from))
    }

    async fn notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        // ---
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT notification_id, device_id, title, body, timestamp, read_by
            FROM notifications
            WHERE read_by ? $1
            ORDER BY timestamp DESC, notification_id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool> {
        // ---
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read_by = read_by || jsonb_build_object($2::text, true)
            WHERE notification_id = $1 AND read_by ? $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_notification(&self, id: &str) -> Result<bool> {
        // ---
        let result = sqlx::query("DELETE FROM notifications WHERE notification_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
