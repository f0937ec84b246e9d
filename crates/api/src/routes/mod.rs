pub mod health;
pub mod uploads;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /uploads                 list own uploads (GET), upload a document (POST)
/// /uploads/{id}            upload status for polling (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/uploads", uploads::router())
}
