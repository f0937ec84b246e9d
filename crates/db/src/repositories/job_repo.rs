//! Repository for the `jobs` table.
//!
//! Every state change is a single guarded `UPDATE` whose `WHERE` clause
//! lists the status ids the job may move from, so concurrent or repeated
//! writes can never regress a job or rewrite a terminal one.

use clauselens_core::analysis::AnalysisResult;
use clauselens_core::job::{JobState, NewJob};
use clauselens_core::types::{DbId, JobId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::job::{JobRow, JobWithOwnerRow};
use crate::models::status::{allowed_source_ids, JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, artifact_name, artifact_location, status_id, \
    result, failure_reason, created_at, updated_at";

/// Same columns, qualified for queries that join `users`.
const JOINED_COLUMNS: &str = "\
    j.id, j.owner_id, j.artifact_name, j.artifact_location, j.status_id, \
    j.result, j.failure_reason, j.created_at, j.updated_at";

/// Non-terminal statuses: created, processing.
const OPEN_STATUSES: [StatusId; 2] = [
    JobStatus::Created as StatusId,
    JobStatus::Processing as StatusId,
];

/// Provides persistence for analysis jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in the `created` state.
    pub async fn create(pool: &PgPool, id: JobId, input: &NewJob) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, owner_id, artifact_name, artifact_location, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(input.owner_id)
            .bind(&input.artifact_name)
            .bind(&input.artifact_location)
            .bind(JobStatus::Created.id())
            .fetch_one(pool)
            .await
    }

    /// Find a job by id regardless of owner.
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job only if it belongs to `owner_id`.
    pub async fn find_for_owner(
        pool: &PgPool,
        id: JobId,
        owner_id: DbId,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job together with its owner's name and email.
    pub async fn find_with_owner(
        pool: &PgPool,
        id: JobId,
    ) -> Result<Option<JobWithOwnerRow>, sqlx::Error> {
        let query = format!(
            "SELECT {JOINED_COLUMNS}, \
                    u.id IS NOT NULL AS owner_found, \
                    u.name AS owner_name, \
                    u.email AS owner_email \
             FROM jobs j \
             LEFT JOIN users u ON u.id = j.owner_id \
             WHERE j.id = $1"
        );
        sqlx::query_as::<_, JobWithOwnerRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all jobs of one owner, most recent first.
    pub async fn list_by_owner(pool: &PgPool, owner_id: DbId) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE owner_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(owner_id)
            .fetch_all(pool)
            .await
    }

    /// Move a job to `processing`. Returns `false` if no row was updated.
    pub async fn mark_processing(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3)",
        )
        .bind(id)
        .bind(JobStatus::Processing.id())
        .bind(allowed_source_ids(JobState::Processing))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record a result and move the job to `completed`.
    pub async fn mark_completed(
        pool: &PgPool,
        id: JobId,
        analysis: &AnalysisResult,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, result = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($4)",
        )
        .bind(id)
        .bind(JobStatus::Completed.id())
        .bind(Json(analysis))
        .bind(allowed_source_ids(JobState::Completed))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record a failure reason and move the job to `failed`.
    pub async fn mark_failed(pool: &PgPool, id: JobId, reason: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, failure_reason = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($4)",
        )
        .bind(id)
        .bind(JobStatus::Failed.id())
        .bind(reason)
        .bind(allowed_source_ids(JobState::Failed))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fail every job still `created` or `processing`. Returns the number moved.
    pub async fn fail_open_jobs(pool: &PgPool, reason: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $1, failure_reason = $2, updated_at = NOW() \
             WHERE status_id = ANY($3)",
        )
        .bind(JobStatus::Failed.id())
        .bind(reason)
        .bind(&OPEN_STATUSES[..])
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
