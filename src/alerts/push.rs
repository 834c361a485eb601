//! Push message shape and the publishers that deliver it.

use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{models::SensorKind, thresholds::Status};

// ---

/// Topic every user of `device_id` subscribes to.
pub fn device_topic(device_id: &str) -> String {
    format!("device-{}", device_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    // ---
    pub topic: String,
    pub notification: PushNotification,
    pub data: PushData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

/// Data payload; every field is a string on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    // ---
    pub sensor_type: SensorKind,
    pub value: String,
    pub status: Status,
    pub timestamp: String,
}

#[async_trait]
pub trait PushPublisher: Send + Sync {
    async fn publish(&self, message: &PushMessage) -> Result<()>;
}

/// Publisher used when no push gateway is configured: logs and drops.
pub struct LogPublisher;

#[async_trait]
impl PushPublisher for LogPublisher {
    async fn publish(&self, message: &PushMessage) -> Result<()> {
        // ---
        tracing::info!(
            topic = %message.topic,
            status = message.data.status.as_str(),
            "Push gateway not configured, dropping message: {}",
            message.notification.title
        );
        Ok(())
    }
}

/// POSTs each message as JSON to a push gateway.
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl PushPublisher for WebhookPublisher {
    async fn publish(&self, message: &PushMessage) -> Result<()> {
        // ---
        tracing::debug!("Publishing push message to {} via {}", message.topic, self.url);

        self.client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .with_context(|| format!("Push gateway {} unreachable", self.url))?
            .error_for_status()
            .context("Push gateway rejected message")?;
        Ok(())
    }
}

/// Keeps every published message in memory.
#[derive(Default)]
pub struct MemoryPublisher {
    sent: Mutex<Vec<PushMessage>>,
}

impl MemoryPublisher {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PushPublisher for MemoryPublisher {
    async fn publish(&self, message: &PushMessage) -> Result<()> {
        // ---
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("push log lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

/// Local push gateway answering every POST to `/push` with `status` and
/// recording the JSON bodies it received.
#[cfg(test)]
pub(crate) async fn spawn_gateway(
    status: axum::http::StatusCode,
) -> (String, std::sync::Arc<Mutex<Vec<serde_json::Value>>>) {
    // ---
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::Arc;

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    let received: Received = Arc::default();
    let app = Router::new()
        .route(
            "/push",
            post(
                move |State(received): State<Received>, Json(body): Json<serde_json::Value>| async move {
                    received.lock().unwrap().push(body);
                    status
                },
            ),
        )
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    (format!("http://{}/push", addr), received)
}
