use std::collections::{hash_map::Entry, BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ProfileUpdate, Store};
use crate::models::{DeviceReadings, Notification, RawValue, SensorKind, UserProfile};

// ---

#[derive(Default)]
struct Inner {
    readings: HashMap<String, DeviceReadings>,
    device_users: HashMap<String, BTreeSet<String>>,
    users: HashMap<String, UserProfile>,
    notifications: HashMap<String, Notification>,
}

/// In-process store. Everything lives behind one lock, so each call sees
/// and leaves a consistent snapshot.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    // ---
    async fn provision_device(&self, device_id: &str) -> Result<()> {
        // ---
        let mut inner = self.inner.write().await;
        inner.readings.entry(device_id.to_string()).or_default();
        inner.device_users.entry(device_id.to_string()).or_default();
        Ok(())
    }

    async fn device_exists(&self, device_id: &str) -> Result<bool> {
        Ok(self.inner.read().await.readings.contains_key(device_id))
    }

    async fn write_reading(
        &self,
        device_id: &str,
        kind: SensorKind,
        timestamp: &str,
        value: &RawValue,
    ) -> Result<bool> {
        // ---
        let mut inner = self.inner.write().await;
        inner.device_users.entry(device_id.to_string()).or_default();
        let previous = inner
            .readings
            .entry(device_id.to_string())
            .or_default()
            .entry(kind)
            .or_default()
            .insert(timestamp.to_string(), value.clone());
        Ok(previous.is_none())
    }

    async fn device_readings(&self, device_id: &str) -> Result<DeviceReadings> {
        // ---
        let inner = self.inner.read().await;
        Ok(inner.readings.get(device_id).cloned().unwrap_or_default())
    }

    async fn device_users(&self, device_id: &str) -> Result<Vec<String>> {
        // ---
        let inner = self.inner.read().await;
        Ok(inner
            .device_users
            .get(device_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_user(&self, profile: &UserProfile) -> Result<()> {
        // ---
        let mut inner = self.inner.write().await;
        for device_id in profile.device_ids() {
            inner
                .device_users
                .entry(device_id)
                .or_default()
                .insert(profile.user_id.clone());
        }
        inner
            .users
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.inner.read().await.users.get(user_id).cloned())
    }

    async fn update_user(&self, user_id: &str, update: &ProfileUpdate) -> Result<bool> {
        // ---
        let mut inner = self.inner.write().await;
        let Some(profile) = inner.users.get_mut(user_id) else {
            return Ok(false);
        };
        if let Some(username) = &update.username {
            profile.username = username.clone();
        }
        if let Some(email) = &update.email {
            profile.email = email.clone();
        }
        Ok(true)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<bool> {
        // ---
        let mut inner = self.inner.write().await;
        match inner.notifications.entry(notification.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(notification.clone());
                Ok(true)
            }
        }
    }

    async fn notification(&self, id: &str) -> Result<Option<Notification>> {
        Ok(self.inner.read().await.notifications.get(id).cloned())
    }

    async fn notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        // ---
        let inner = self.inner.read().await;
        let mut found: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.read_by.contains_key(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool> {
        // ---
        let mut inner = self.inner.write().await;
        let flag = inner
            .notifications
            .get_mut(id)
            .and_then(|notification| notification.read_by.get_mut(user_id));
        match flag {
            Some(read) => {
                *read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_notification(&self, id: &str) -> Result<bool> {
        Ok(self.inner.write().await.notifications.remove(id).is_some())
    }
}

/// Build a profile linked to the given devices.
#[cfg(test)]
pub(crate) fn profile(user_id: &str, devices: &[&str]) -> UserProfile {
    UserProfile {
        user_id: user_id.to_string(),
        username: format!("{user_id}-name"),
        email: format!("{user_id}@example.com"),
        devices: devices
            .iter()
            .map(|d| (d.to_string(), true))
            .collect::<std::collections::BTreeMap<_, _>>(),
    }
}
