//! User directory: registration with a device link, profile lookup and
//! profile edits.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::error::ApiError;
use crate::{AppState, ProfileUpdate, UserProfile};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/users", post(register))
        .route("/users/{user_id}", get(profile).patch(update))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default, alias = "deviceId")]
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    username: Option<String>,
    email: Option<String>,
}

/// Loose `something@domain.tld` check, no whitespace anywhere.
fn looks_like_email(email: &str) -> bool {
    // ---
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain
            .rsplit_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    // ---
    let username = req.username.trim();
    let email = req.email.trim();
    let device_id = req.device_id.trim();

    if username.is_empty() || email.is_empty() || device_id.is_empty() {
        return Err(ApiError::BadRequest("Please fill in all fields.".into()));
    }
    if !looks_like_email(email) {
        return Err(ApiError::BadRequest("Invalid email format.".into()));
    }
    if !state.store.device_exists(device_id).await? {
        return Err(ApiError::BadRequest("Invalid Device ID.".into()));
    }

    let profile = UserProfile {
        user_id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: email.to_string(),
        devices: BTreeMap::from([(device_id.to_string(), true)]),
    };
    state.store.create_user(&profile).await?;
    info!("Registered user {} for device {}", profile.user_id, device_id);

    Ok((StatusCode::CREATED, Json(profile)))
}

async fn profile(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ApiError> {
    // ---
    state
        .store
        .user(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User profile not found.".into()))
}

async fn update(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    // ---
    let username = req.username.map(|u| u.trim().to_string());
    let email = req.email.map(|e| e.trim().to_string());

    if username.is_none() && email.is_none() {
        return Err(ApiError::BadRequest("Nothing to update.".into()));
    }
    if username.as_deref() == Some("") {
        return Err(ApiError::BadRequest("Username cannot be empty.".into()));
    }
    match email.as_deref() {
        Some("") => return Err(ApiError::BadRequest("Email cannot be empty.".into())),
        Some(e) if !looks_like_email(e) => {
            return Err(ApiError::BadRequest("Invalid email format.".into()))
        }
        _ => {}
    }

    let update = ProfileUpdate { username, email };
    if !state.store.update_user(&user_id, &update).await? {
        return Err(ApiError::NotFound("User profile not found.".into()));
    }

    profile(Path(user_id), State(state)).await
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_email_check() {
        // ---
        assert!(looks_like_email("a@b.co"));
        assert!(looks_like_email("first.last@sub.example.org"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a b@c.d"));
        assert!(!looks_like_email("plain"));
        assert!(!looks_like_email("a@.co"));
    }
}
