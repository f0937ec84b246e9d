//! Row models for the `jobs` table.

use clauselens_core::analysis::AnalysisResult;
use clauselens_core::job::{ElevatedJob, Job, OwnerProfile};
use clauselens_core::types::{DbId, JobId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: JobId,
    pub owner_id: DbId,
    pub artifact_name: String,
    pub artifact_location: String,
    pub status_id: StatusId,
    pub result: Option<Json<AnalysisResult>>,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A `jobs` row left-joined with its owner's display fields from `users`.
#[derive(Debug, Clone, FromRow)]
pub struct JobWithOwnerRow {
    #[sqlx(flatten)]
    pub job: JobRow,
    pub owner_found: bool,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
}

/// The row carries a `status_id` with no matching [`JobStatus`].
#[derive(Debug, thiserror::Error)]
#[error("job {job_id} has unknown status_id {status_id}")]
pub struct UnknownStatus {
    pub job_id: JobId,
    pub status_id: StatusId,
}

impl TryFrom<JobRow> for Job {
    type Error = UnknownStatus;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = JobStatus::from_id(row.status_id)
            .ok_or(UnknownStatus {
                job_id: row.id,
                status_id: row.status_id,
            })?
            .into();
        Ok(Job {
            id: row.id,
            owner_id: row.owner_id,
            artifact_name: row.artifact_name,
            artifact_location: row.artifact_location,
            state,
            result: row.result.map(|Json(result)| result),
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<JobWithOwnerRow> for ElevatedJob {
    type Error = UnknownStatus;

    fn try_from(row: JobWithOwnerRow) -> Result<Self, Self::Error> {
        let owner = row.owner_found.then(|| OwnerProfile {
            name: row.owner_name,
            email: row.owner_email,
        });
        Ok(ElevatedJob {
            job: Job::try_from(row.job)?,
            owner,
        })
    }
}
