//! Database schema management for `aquaflow`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` when a database is configured.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Mirrors the realtime store layout: devices, the user directory with its
/// device links in both directions, raw readings keyed by
/// `(device, sensor, timestamp)` and notifications with their `readBy` map.
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            device_id   TEXT PRIMARY KEY,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id   TEXT PRIMARY KEY,
            username  TEXT NOT NULL,
            email     TEXT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Both `users/{id}/devices` and `devices/{id}/userId` are served from here
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_users (
            device_id  TEXT NOT NULL REFERENCES devices (device_id) ON DELETE CASCADE,
            user_id    TEXT NOT NULL REFERENCES users (user_id) ON DELETE CASCADE,
            PRIMARY KEY (device_id, user_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Raw values are kept as written (number or string), hence JSONB
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            device_id    TEXT  NOT NULL REFERENCES devices (device_id) ON DELETE CASCADE,
            sensor_kind  TEXT  NOT NULL,
            ts_key       TEXT  NOT NULL,
            value        JSONB NOT NULL,
            PRIMARY KEY (device_id, sensor_kind, ts_key)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            notification_id  TEXT PRIMARY KEY,
            device_id        TEXT  NOT NULL,
            title            TEXT  NOT NULL,
            body             TEXT  NOT NULL,
            timestamp        TEXT  NOT NULL,
            read_by          JSONB NOT NULL DEFAULT '{}'::jsonb
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_device_users_user_id
            ON device_users (user_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_notifications_read_by
            ON notifications USING GIN (read_by);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
