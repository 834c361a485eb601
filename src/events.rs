//! In-process event bus connecting writers (HTTP ingest, the alert monitor)
//! to subscribers (the monitor itself, live dashboard streams).
//!
//! The bus is owned by the application state and dropped with it; there is no
//! global listener registry. Every subscriber gets its own bounded receiver.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{RawValue, SensorKind};

// ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    /// A value was written at `device/sensor/timestamp`.
    ReadingWritten {
        device_id: String,
        sensor_kind: SensorKind,
        timestamp: String,
        value: RawValue,
        /// `false` when an existing key was overwritten.
        created: bool,
    },
    NotificationCreated {
        id: String,
        device_id: String,
    },
}

impl SensorEvent {
    // ---
    pub fn device_id(&self) -> &str {
        match self {
            SensorEvent::ReadingWritten { device_id, .. } => device_id,
            SensorEvent::NotificationCreated { device_id, .. } => device_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SensorEvent>,
}

impl EventBus {
    // ---
    /// Create a bus whose subscribers buffer at most `capacity` events
    /// before they start lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; returns how many subscribers will see it.
    pub fn publish(&self, event: SensorEvent) -> usize {
        // ---
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!("No subscribers for event on {}", event.device_id());
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
