use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::FixedOffset;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

use aquaflow::{
    AlertDispatcher, AppState, EventBus, MemoryPublisher, MemoryStore, Monitor, MonitorHandle,
    Status, ThresholdTable,
};

struct TestApp {
    base: String,
    client: Client,
    push: Arc<MemoryPublisher>,
    _monitor: MonitorHandle,
}

/// Serve the full application on an ephemeral port, backed by the in-memory
/// store and a recording push publisher.
async fn spawn_app() -> Result<TestApp> {
    // ---
    let store = Arc::new(MemoryStore::new());
    let push = Arc::new(MemoryPublisher::new());
    let thresholds = Arc::new(ThresholdTable::load(None)?);
    let bus = EventBus::new(64);

    let dispatcher = AlertDispatcher::new(store.clone(), push.clone());
    let monitor = Monitor::new(thresholds.clone(), dispatcher, bus.clone()).spawn();

    let app = aquaflow::app(AppState {
        store,
        thresholds,
        bus,
        report_offset: FixedOffset::east_opt(0).ok_or_else(|| anyhow!("offset"))?,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    Ok(TestApp {
        base: format!("http://{}", addr),
        client: Client::new(),
        push,
        _monitor: monitor,
    })
}

impl TestApp {
    // ---
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn provision(&self, device_id: &str) -> Result<()> {
        let resp = self.client.put(self.url(&format!("/devices/{}", device_id))).send().await?;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        Ok(())
    }

    async fn write(&self, device_id: &str, sensor: &str, ts: &str, value: Value) -> Result<Response> {
        let path = format!("/devices/{}/sensors/{}/{}", device_id, sensor, ts);
        Ok(self.client.put(self.url(&path)).json(&value).send().await?)
    }

    async fn register(&self, username: &str, device_id: &str) -> Result<String> {
        // ---
        let resp = self
            .client
            .post(self.url("/users"))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "deviceId": device_id,
            }))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await?;
        body["userId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no userId in {}", body))
    }

    async fn notifications(&self, user_id: &str) -> Result<Vec<Value>> {
        let path = format!("/users/{}/notifications", user_id);
        Ok(self.client.get(self.url(&path)).send().await?.json().await?)
    }

    async fn unread(&self, user_id: &str) -> Result<u64> {
        // ---
        let path = format!("/users/{}/notifications/unread", user_id);
        let body: Value = self.client.get(self.url(&path)).send().await?.json().await?;
        body["unread_count"]
            .as_u64()
            .ok_or_else(|| anyhow!("no unread_count in {}", body))
    }

    /// Poll until the monitor has produced at least `count` notifications.
    async fn wait_for_notifications(&self, user_id: &str, count: usize) -> Result<Vec<Value>> {
        // ---
        for _ in 0..100 {
            let list = self.notifications(user_id).await?;
            if list.len() >= count {
                return Ok(list);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Err(anyhow!("expected {} notifications for {}", count, user_id))
    }
}

#[tokio::test]
async fn health_reports_monitor_subscription() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    let body: Value = app.client.get(app.url("/health")).send().await?.json().await?;

    assert_eq!(body["status"], "ok");
    assert!(body["subscribers"].as_u64().unwrap_or(0) >= 1);
    Ok(())
}

#[tokio::test]
async fn danger_reading_notifies_device_users() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-1").await?;
    let user_id = app.register("alice", "tank-1").await?;

    let resp = app.write("tank-1", "ph", "2024-03-05T10:00:00Z", json!(4.5)).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let list = app.wait_for_notifications(&user_id, 1).await?;
    let notification = &list[0];
    assert_eq!(notification["deviceId"], "tank-1");
    assert_eq!(notification["title"], "❗ Critical Alert: PH");
    assert_eq!(notification["read"], false);
    assert!(notification["body"]
        .as_str()
        .unwrap_or_default()
        .starts_with("PH level has exceeded the optimal range at 4.5."));

    let sent = app.push.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "device-tank-1");
    assert_eq!(sent[0].data.value, "4.5");
    assert_eq!(sent[0].data.status, Status::Danger);

    assert_eq!(app.unread(&user_id).await?, 1);

    let id = notification["id"].as_str().unwrap_or_default().to_string();
    let read_url = app.url(&format!("/notifications/{}/read/{}", id, user_id));
    assert_eq!(app.client.post(&read_url).send().await?.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.unread(&user_id).await?, 0);
    assert_eq!(app.notifications(&user_id).await?[0]["read"], true);

    let delete_url = app.url(&format!("/notifications/{}", id));
    assert_eq!(app.client.delete(&delete_url).send().await?.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.client.delete(&delete_url).send().await?.status(), StatusCode::NOT_FOUND);
    assert!(app.notifications(&user_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn non_recipient_cannot_mark_read() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-9").await?;
    app.provision("tank-10").await?;
    let owner = app.register("dana", "tank-9").await?;
    let stranger = app.register("mallory", "tank-10").await?;

    app.write("tank-9", "tds", "2024-03-05T10:00:00Z", json!(2500)).await?;
    let list = app.wait_for_notifications(&owner, 1).await?;
    let id = list[0]["id"].as_str().unwrap_or_default().to_string();

    let read_url = app.url(&format!("/notifications/{}/read/{}", id, stranger));
    assert_eq!(app.client.post(&read_url).send().await?.status(), StatusCode::NOT_FOUND);

    assert!(app.notifications(&stranger).await?.is_empty());
    assert_eq!(app.unread(&owner).await?, 1);
    Ok(())
}

#[tokio::test]
async fn burst_of_unsafe_readings_keeps_every_notification() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-11").await?;
    let user_id = app.register("frank", "tank-11").await?;

    let ts = "2024-03-05T10:00:00Z";
    app.write("tank-11", "ph", ts, json!(3.0)).await?;
    app.write("tank-11", "temperature", ts, json!(40)).await?;
    app.write("tank-11", "tds", ts, json!(2500)).await?;

    let list = app.wait_for_notifications(&user_id, 3).await?;
    assert_eq!(list.len(), 3);
    Ok(())
}

#[tokio::test]
async fn only_new_unsafe_readings_alert() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-2").await?;
    let user_id = app.register("bob", "tank-2").await?;

    let safe = app.write("tank-2", "ph", "2024-03-05T10:00:00Z", json!(7.5)).await?;
    assert_eq!(safe.status(), StatusCode::CREATED);
    let danger = app.write("tank-2", "ph", "2024-03-05T10:05:00Z", json!(9.5)).await?;
    assert_eq!(danger.status(), StatusCode::CREATED);

    app.wait_for_notifications(&user_id, 1).await?;

    // Overwriting an existing key is an update, not a new reading.
    let overwrite = app.write("tank-2", "ph", "2024-03-05T10:05:00Z", json!(9.9)).await?;
    assert_eq!(overwrite.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.notifications(&user_id).await?.len(), 1);
    assert_eq!(app.push.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn dashboard_shows_latest_value_and_trend() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-3").await?;
    app.write("tank-3", "tds", "2024-03-05T10:00:00Z", json!(400)).await?;
    app.write("tank-3", "tds", "2024-03-05T11:00:00Z", json!("600")).await?;

    let body: Value = app
        .client
        .get(app.url("/devices/tank-3/dashboard"))
        .send()
        .await?
        .json()
        .await?;

    let cards = body["sensors"].as_array().cloned().unwrap_or_default();
    assert_eq!(cards.len(), 1);
    let card = &cards[0];
    assert_eq!(card["sensor"], "tds");
    assert_eq!(card["unit"], "ppm");
    assert_eq!(card["value"], 600.0);
    assert_eq!(card["status"], "safe");
    assert_eq!(card["prediction"]["trend"], "increase");
    assert_eq!(card["trend_message"], "Expected to increase by 50.0%");

    let missing = app.client.get(app.url("/devices/nope/dashboard")).send().await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn user_dashboard_covers_linked_devices() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-6").await?;
    app.write("tank-6", "temperature", "2024-03-05T10:00:00Z", json!(25)).await?;
    let user_id = app.register("erin", "tank-6").await?;

    let body: Value = app
        .client
        .get(app.url(&format!("/users/{}/dashboard", user_id)))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body[0]["device_id"], "tank-6");
    assert_eq!(body[0]["sensors"][0]["trend_message"], "Expected to be stable");

    let missing = app.client.get(app.url("/users/ghost/dashboard")).send().await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn analytics_aggregates_a_month() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-4").await?;
    app.write("tank-4", "tds", "2024-03-05T08:00:00Z", json!(10)).await?;
    app.write("tank-4", "tds", "2024-03-05T20:00:00Z", json!(20)).await?;
    app.write("tank-4", "tds", "2024-04-01T00:00:00Z", json!(999)).await?;

    let resp = app
        .client
        .get(app.url("/devices/tank-4/analytics?year=2024&month=3"))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await?;

    let tds = &body["sensors"]["tds"];
    let points = tds["data_points"].as_array().cloned().unwrap_or_default();
    assert_eq!(points.len(), 31);
    assert_eq!(points[4], json!({"day": 5, "average": 15.0}));
    assert_eq!(points[5]["average"], 0.0);
    assert_eq!(tds["summary"], json!({"min": 10.0, "max": 20.0, "avg": 15.0}));

    let ph = &body["sensors"]["ph"];
    assert_eq!(ph["data_points"].as_array().map(Vec::len), Some(31));
    assert_eq!(ph["summary"], json!({"min": 0.0, "max": 0.0, "avg": 0.0}));

    let bad = app
        .client
        .get(app.url("/devices/tank-4/analytics?year=2024&month=13"))
        .send()
        .await?;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let garbled = app
        .client
        .get(app.url("/devices/tank-4/analytics?year=2024&month=abc"))
        .send()
        .await?;
    assert_eq!(garbled.status(), StatusCode::BAD_REQUEST);
    let body: Value = garbled.json().await?;
    assert!(body["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn registration_validates_input() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-5").await?;

    let cases = [
        (
            json!({"username": " ", "email": "a@b.co", "deviceId": "tank-5"}),
            "Please fill in all fields.",
        ),
        (
            json!({"username": "carol", "email": "not-an-email", "deviceId": "tank-5"}),
            "Invalid email format.",
        ),
        (
            json!({"username": "carol", "email": "c@example.com", "deviceId": "missing"}),
            "Invalid Device ID.",
        ),
    ];
    for (payload, message) in cases {
        let resp = app.client.post(app.url("/users")).json(&payload).send().await?;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await?;
        assert_eq!(body["error"], message);
    }

    let user_id = app.register("carol", "tank-5").await?;
    let profile_url = app.url(&format!("/users/{}", user_id));

    let resp = app
        .client
        .patch(&profile_url)
        .json(&json!({"username": "  "}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let updated: Value = app
        .client
        .patch(&profile_url)
        .json(&json!({"email": "carol@water.example"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(updated["username"], "carol");
    assert_eq!(updated["email"], "carol@water.example");
    assert_eq!(updated["devices"]["tank-5"], true);
    Ok(())
}

#[tokio::test]
async fn unknown_sensor_is_rejected() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-7").await?;

    let resp = app.write("tank-7", "turbidity", "2024-03-05T10:00:00Z", json!(1)).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let snapshot: Value = app
        .client
        .get(app.url("/devices/tank-7/sensors"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(snapshot, json!({}));
    Ok(())
}

/// Read SSE chunks until the accumulated text contains `needle`.
async fn read_until(resp: &mut Response, buffer: &mut String, needle: &str) -> Result<()> {
    // ---
    tokio::time::timeout(Duration::from_secs(3), async {
        while !buffer.contains(needle) {
            match resp.chunk().await? {
                Some(chunk) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                None => return Err(anyhow!("stream ended before '{}'", needle)),
            }
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for '{}'", needle))?
}

#[tokio::test]
async fn dashboard_stream_pushes_fresh_snapshots() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    app.provision("tank-8").await?;
    app.write("tank-8", "ph", "2024-03-05T10:00:00Z", json!(7.2)).await?;

    let mut stream = app
        .client
        .get(app.url("/devices/tank-8/dashboard/stream"))
        .send()
        .await?;
    assert_eq!(stream.status(), StatusCode::OK);

    let mut buffer = String::new();
    read_until(&mut stream, &mut buffer, "\"value\":7.2").await?;
    assert!(buffer.contains("event: snapshot"));

    app.write("tank-8", "ph", "2024-03-05T10:05:00Z", json!(7.6)).await?;
    read_until(&mut stream, &mut buffer, "\"value\":7.6").await?;
    Ok(())
}
