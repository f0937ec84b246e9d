//! PostgreSQL implementation of the [`JobStore`] port.

use async_trait::async_trait;
use clauselens_core::analysis::AnalysisResult;
use clauselens_core::job::{ElevatedJob, Job, JobState, NewJob};
use clauselens_core::store::{JobStore, StoreError};
use clauselens_core::types::{new_job_id, DbId, JobId};

use crate::models::job::UnknownStatus;
use crate::repositories::JobRepo;
use crate::DbPool;

/// [`JobStore`] backed by the `jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Explain why a guarded update touched no row.
    async fn rejected(&self, id: JobId, to: JobState) -> StoreError {
        match JobRepo::find_by_id(&self.pool, id).await {
            Ok(Some(row)) => match Job::try_from(row) {
                Ok(job) => StoreError::InvalidTransition {
                    id,
                    from: job.state,
                    to,
                },
                Err(e) => corrupt(e),
            },
            Ok(None) => StoreError::NotFound(id),
            Err(e) => backend(e),
        }
    }

    async fn guarded(
        &self,
        id: JobId,
        to: JobState,
        updated: Result<bool, sqlx::Error>,
    ) -> Result<(), StoreError> {
        if updated.map_err(backend)? {
            Ok(())
        } else {
            Err(self.rejected(id, to).await)
        }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn corrupt(e: UnknownStatus) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, input: NewJob) -> Result<Job, StoreError> {
        let row = JobRepo::create(&self.pool, new_job_id(), &input)
            .await
            .map_err(backend)?;
        Job::try_from(row).map_err(corrupt)
    }

    async fn get(&self, id: JobId, requesting_owner: DbId) -> Result<Job, StoreError> {
        let row = JobRepo::find_for_owner(&self.pool, id, requesting_owner)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(id))?;
        Job::try_from(row).map_err(corrupt)
    }

    async fn get_elevated(&self, id: JobId) -> Result<ElevatedJob, StoreError> {
        let row = JobRepo::find_with_owner(&self.pool, id)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(id))?;
        ElevatedJob::try_from(row).map_err(corrupt)
    }

    async fn set_processing(&self, id: JobId) -> Result<(), StoreError> {
        let updated = JobRepo::mark_processing(&self.pool, id).await;
        self.guarded(id, JobState::Processing, updated).await
    }

    async fn set_completed(&self, id: JobId, result: &AnalysisResult) -> Result<(), StoreError> {
        let updated = JobRepo::mark_completed(&self.pool, id, result).await;
        self.guarded(id, JobState::Completed, updated).await
    }

    async fn set_failed(&self, id: JobId, reason: &str) -> Result<(), StoreError> {
        let updated = JobRepo::mark_failed(&self.pool, id, reason).await;
        self.guarded(id, JobState::Failed, updated).await
    }

    async fn list_by_owner(&self, owner: DbId) -> Result<Vec<Job>, StoreError> {
        JobRepo::list_by_owner(&self.pool, owner)
            .await
            .map_err(backend)?
            .into_iter()
            .map(|row| Job::try_from(row).map_err(corrupt))
            .collect()
    }

    async fn fail_interrupted(&self, reason: &str) -> Result<u64, StoreError> {
        JobRepo::fail_open_jobs(&self.pool, reason)
            .await
            .map_err(backend)
    }
}
