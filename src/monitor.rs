//! Server-side trigger: classify every newly created reading and raise
//! alerts for the ones outside the safe range.
//!
//! The monitor runs as a single background task fed by the [`EventBus`].
//! Events are handled one at a time; a failure while handling one event is
//! logged and never stops the loop.

use std::sync::Arc;

use tokio::{
    sync::{broadcast::error::RecvError, oneshot},
    task::JoinHandle,
};

use crate::{
    alerts::{Alert, AlertDispatcher},
    events::{EventBus, SensorEvent},
    models::Notification,
    thresholds::ThresholdTable,
};

// ---

pub struct Monitor {
    thresholds: Arc<ThresholdTable>,
    dispatcher: AlertDispatcher,
    bus: EventBus,
}

/// Running monitor task. Dropping the handle leaves the task running until
/// the bus closes; call [`MonitorHandle::shutdown`] to stop it explicitly.
pub struct MonitorHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    // ---
    pub async fn shutdown(self) {
        // ---
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Monitor task ended abnormally: {}", e);
        }
    }
}

impl Monitor {
    // ---
    pub fn new(thresholds: Arc<ThresholdTable>, dispatcher: AlertDispatcher, bus: EventBus) -> Self {
        Self {
            thresholds,
            dispatcher,
            bus,
        }
    }

    /// Subscribe to the bus and start processing events in the background.
    ///
    /// The subscription is taken before this returns, so events published
    /// afterwards are never missed.
    pub fn spawn(self) -> MonitorHandle {
        // ---
        let mut events = self.bus.subscribe();
        let (shutdown, mut stop) = oneshot::channel();

        let task = tokio::spawn(async move {
            tracing::info!("Sensor monitor started");
            loop {
                tokio::select! {
                    Ok(()) = &mut stop => break,
                    received = events.recv() => match received {
                        Ok(event) => {
                            self.process(&event).await;
                        }
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!("Sensor monitor lagged, {} events skipped", missed);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            tracing::info!("Sensor monitor stopped");
        });

        MonitorHandle { shutdown, task }
    }

    /// Handle a single event. Returns the notification it raised, if any.
    pub async fn process(&self, event: &SensorEvent) -> Option<Notification> {
        // ---
        let SensorEvent::ReadingWritten {
            device_id,
            sensor_kind,
            timestamp,
            value,
            created: true,
        } = event
        else {
            return None;
        };

        // Only numeric writes are evaluated, matching what devices send.
        let Some(number) = value.as_number().filter(|_| !device_id.is_empty()) else {
            tracing::error!(
                "Invalid data: deviceId={:?} sensorType={} value={:?}",
                device_id,
                sensor_kind,
                value
            );
            return None;
        };

        let status = match self.thresholds.classify(*sensor_kind, number) {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Cannot classify reading at {}: {}", timestamp, e);
                return None;
            }
        };
        tracing::debug!(
            "{}/{}/{} = {} classified {}",
            device_id,
            sensor_kind,
            timestamp,
            number,
            status.as_str()
        );

        let alert = Alert {
            device_id: device_id.clone(),
            sensor_kind: *sensor_kind,
            value: number,
            status,
        };

        match self.dispatcher.dispatch(&alert).await {
            Ok(Some(notification)) => {
                self.bus.publish(SensorEvent::NotificationCreated {
                    id: notification.id.clone(),
                    device_id: notification.device_id.clone(),
                });
                Some(notification)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Error processing sensor data: {}", e);
                None
            }
        }
    }
}
