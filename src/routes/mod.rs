use axum::Router;

use crate::AppState;

mod analytics;
mod dashboard;
mod error;
mod health;
mod notifications;
mod readings;
mod users;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(readings::router())
        .merge(dashboard::router())
        .merge(analytics::router())
        .merge(users::router())
        .merge(notifications::router())
        .merge(health::router())
        .with_state(state)
}
