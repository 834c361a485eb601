use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use super::error::ApiError;
use crate::{AppState, Notification};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/users/{user_id}/notifications", get(list))
        .route("/users/{user_id}/notifications/unread", get(unread))
        .route("/notifications/{id}/read/{user_id}", post(mark_read))
        .route("/notifications/{id}", delete(remove))
}

/// A notification as seen by one user.
#[derive(Debug, Serialize)]
struct NotificationView {
    #[serde(flatten)]
    notification: Notification,
    read: bool,
}

#[derive(Debug, Serialize)]
struct UnreadResponse {
    unread_count: usize,
}

async fn list(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationView>>, ApiError> {
    // ---
    let views = state
        .store
        .notifications_for_user(&user_id)
        .await?
        .into_iter()
        .map(|notification| NotificationView {
            read: notification.is_read_by(&user_id),
            notification,
        })
        .collect();
    Ok(Json(views))
}

async fn unread(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UnreadResponse>, ApiError> {
    // ---
    let unread_count = state
        .store
        .notifications_for_user(&user_id)
        .await?
        .iter()
        .filter(|n| !n.is_read_by(&user_id))
        .count();
    Ok(Json(UnreadResponse { unread_count }))
}

/// Flip the caller's own `readBy` flag. Already-read notifications are left
/// untouched; users who were not recipients get a 404.
async fn mark_read(
    Path((id, user_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    // ---
    let not_found = || ApiError::NotFound("Notification not found.".into());

    let notification = state.store.notification(&id).await?.ok_or_else(not_found)?;
    if !notification.read_by.contains_key(&user_id) {
        return Err(not_found());
    }

    if !notification.is_read_by(&user_id) && !state.store.mark_read(&id, &user_id).await? {
        // Deleted between the lookup and the update.
        return Err(not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    // ---
    if state.store.delete_notification(&id).await? {
        info!("Deleted notification {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Notification not found.".into()))
    }
}
