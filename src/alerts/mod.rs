//! Alert dispatch: turn a classified reading into a stored notification and
//! a push message on the device topic.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::{
    models::{Notification, SensorKind},
    store::Store,
    thresholds::Status,
};

pub mod message;
mod push;

pub use push::{
    device_topic, LogPublisher, MemoryPublisher, PushData, PushMessage, PushNotification,
    PushPublisher, WebhookPublisher,
};

// ---

/// A classified reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    // ---
    pub device_id: String,
    pub sensor_kind: SensorKind,
    pub value: f64,
    pub status: Status,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("failed to look up users of device {device_id}: {error}")]
    Directory {
        device_id: String,
        error: anyhow::Error,
    },
    #[error("failed to save notification {id}: {error}")]
    Persist { id: String, error: anyhow::Error },
    #[error("failed to publish notification {id}: {error}")]
    Publish { id: String, error: anyhow::Error },
}

pub struct AlertDispatcher {
    store: Arc<dyn Store>,
    push: Arc<dyn PushPublisher>,
}

impl AlertDispatcher {
    // ---
    pub fn new(store: Arc<dyn Store>, push: Arc<dyn PushPublisher>) -> Self {
        Self { store, push }
    }

    pub async fn dispatch(&self, alert: &Alert) -> Result<Option<Notification>, AlertError> {
        self.dispatch_at(alert, Utc::now()).await
    }

    /// Persist a notification for every user of the device and publish it to
    /// the device topic.
    ///
    /// `safe` alerts and devices without users are no-ops and return `None`.
    /// The notification is stored before the push goes out, so a failed push
    /// still leaves the record behind.
    pub async fn dispatch_at(
        &self,
        alert: &Alert,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, AlertError> {
        // ---
        let (Some(title), Some(body)) = (
            message::title(alert.sensor_kind, alert.status),
            message::body(alert.sensor_kind, alert.status, alert.value),
        ) else {
            return Ok(None);
        };

        let users = self
            .store
            .device_users(&alert.device_id)
            .await
            .map_err(|error| AlertError::Directory {
                device_id: alert.device_id.clone(),
                error,
            })?;

        if users.is_empty() {
            tracing::error!("No users found for device: {}", alert.device_id);
            return Ok(None);
        }

        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut notification = Notification {
            id: notification_id(now, 0),
            device_id: alert.device_id.clone(),
            title,
            body,
            timestamp: timestamp.clone(),
            read_by: users.into_iter().map(|user| (user, false)).collect::<BTreeMap<_, _>>(),
        };
        self.persist(&mut notification, now).await?;
        tracing::info!("Notification saved: {}", notification.id);

        let message = PushMessage {
            topic: device_topic(&alert.device_id),
            notification: PushNotification {
                title: notification.title.clone(),
                body: notification.body.clone(),
            },
            data: PushData {
                sensor_type: alert.sensor_kind,
                value: message::format_value(alert.value),
                status: alert.status,
                timestamp,
            },
        };

        self.push
            .publish(&message)
            .await
            .map_err(|error| AlertError::Publish {
                id: notification.id.clone(),
                error,
            })?;
        tracing::info!("Push notification sent to device topic: {}", message.topic);

        Ok(Some(notification))
    }

    /// Store `notification`, moving to the next free id when alerts raised
    /// in the same millisecond collide.
    async fn persist(
        &self,
        notification: &mut Notification,
        now: DateTime<Utc>,
    ) -> Result<(), AlertError> {
        // ---
        for attempt in 0..MAX_ID_ATTEMPTS {
            notification.id = notification_id(now, attempt);
            let inserted = self
                .store
                .insert_notification(notification)
                .await
                .map_err(|error| AlertError::Persist {
                    id: notification.id.clone(),
                    error,
                })?;
            if inserted {
                return Ok(());
            }
            tracing::debug!("Notification id {} taken, retrying", notification.id);
        }
        Err(AlertError::Persist {
            id: notification.id.clone(),
            error: anyhow::anyhow!("no free id after {} attempts", MAX_ID_ATTEMPTS),
        })
    }
}

const MAX_ID_ATTEMPTS: u32 = 1000;

/// `notif_{millis}`, then `notif_{millis}_{n}` for later alerts in the same
/// millisecond.
fn notification_id(now: DateTime<Utc>, attempt: u32) -> String {
    match attempt {
        0 => format!("notif_{}", now.timestamp_millis()),
        n => format!("notif_{}_{}", now.timestamp_millis(), n),
    }
}
