//! Route definitions for the `/uploads` resource.
//!
//! All endpoints require authentication.

use axum::routing::get;
use axum::Router;

use crate::handlers::uploads;
use crate::state::AppState;

/// Routes mounted at `/uploads`.
///
/// ```text
/// GET    /                -> list_uploads
/// POST   /                -> create_upload
/// GET    /{id}            -> get_upload
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(uploads::list_uploads).post(uploads::create_upload))
        .route("/{id}", get(uploads::get_upload))
}
