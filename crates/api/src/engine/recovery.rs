//! Startup recovery for jobs left open by a previous server process.

use clauselens_core::store::{JobStore, StoreError};

/// Failure reason recorded on jobs interrupted by a restart.
pub const INTERRUPTED_REASON: &str = "interrupted by server restart";

/// Fail every job still `Created` or `Processing`.
///
/// Must run before the dispatcher starts: at that point no worker from this
/// process exists, and workers from the previous one died with it.
pub async fn fail_interrupted_jobs(store: &dyn JobStore) -> Result<u64, StoreError> {
    let moved = store.fail_interrupted(INTERRUPTED_REASON).await?;
    if moved > 0 {
        tracing::warn!(count = moved, "Failed jobs interrupted by restart");
    } else {
        tracing::info!("No interrupted jobs to recover");
    }
    Ok(moved)
}
