use std::sync::Arc;

use clauselens_core::artifact::ArtifactStore;
use clauselens_core::store::JobStore;

use crate::config::ServerConfig;
use crate::engine::DispatchHandle;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Durable job records.
    pub store: Arc<dyn JobStore>,
    /// Uploaded artifact storage.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Sending side of the dispatch queue.
    pub dispatch: DispatchHandle,
    /// Database pool, when the job store is Postgres-backed. Used by the health check.
    pub pool: Option<clauselens_db::DbPool>,
}
