//! Handlers for the `/uploads` resource.
//!
//! All endpoints require authentication. Regular principals see only their
//! own uploads; admins may read any upload by id.

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use clauselens_core::analysis::AnalysisResult;
use clauselens_core::error::CoreError;
use clauselens_core::job::{Job, JobState, NewJob, OwnerProfile};
use clauselens_core::types::{parse_job_id, JobId, Timestamp};
use clauselens_core::worker::DispatchedJob;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAuth;
use crate::state::AppState;

/// Multipart field carrying the document.
const FILE_FIELD: &str = "file";

/// Display name used when the client sends no file name.
const DEFAULT_FILE_NAME: &str = "document";

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// Body of a successful `POST /uploads`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub upload_id: JobId,
    pub message: &'static str,
}

/// Body of `GET /uploads/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub upload_id: JobId,
    pub file_name: String,
    pub state: JobState,
    pub analysis_result: Option<AnalysisResult>,
    pub failure_reason: Option<String>,
    pub uploaded_at: Timestamp,
    /// Only present on the admin path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerProfile>,
}

impl UploadStatus {
    fn new(job: Job, owner: Option<OwnerProfile>) -> Self {
        Self {
            upload_id: job.id,
            file_name: job.artifact_name,
            state: job.state,
            analysis_result: job.result,
            failure_reason: job.failure_reason,
            uploaded_at: job.created_at,
            owner,
        }
    }
}

/// One entry of `GET /uploads`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub upload_id: JobId,
    pub file_name: String,
    pub uploaded_at: Timestamp,
    pub state: JobState,
    pub analysis_result: Option<AnalysisResult>,
}

impl From<Job> for UploadSummary {
    fn from(job: Job) -> Self {
        Self {
            upload_id: job.id,
            file_name: job.artifact_name,
            uploaded_at: job.created_at,
            state: job.state,
            analysis_result: job.result,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// Read the `file` part, ignoring any other fields.
async fn read_file_field(multipart: &mut Multipart) -> AppResult<Option<(String, Vec<u8>)>> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(FILE_FIELD) {
            file = Some(read_field(field).await?);
        }
    }
    Ok(file)
}

async fn read_field(field: Field<'_>) -> AppResult<(String, Vec<u8>)> {
    let file_name = field
        .file_name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME)
        .to_string();
    let data = field.bytes().await.map_err(multipart_error)?;
    Ok((file_name, data.to_vec()))
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// POST /api/v1/uploads
///
/// Store the document, record a job and queue it for analysis. Returns as
/// soon as the job is queued; clients poll `GET /uploads/{id}` for the result.
pub async fn create_upload(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadAccepted>> {
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let (file_name, data) = read_file_field(&mut multipart)
        .await?
        .ok_or_else(|| CoreError::Validation("No file uploaded".into()))?;
    if data.is_empty() {
        return Err(CoreError::Validation("Uploaded file is empty".into()).into());
    }

    // Claim queue space first so a busy server refuses before storing anything.
    let slot = state.dispatch.reserve()?;

    let stored = state.artifacts.put(&file_name, &data).await?;

    let new_job = NewJob {
        owner_id: user.user_id,
        artifact_name: file_name,
        artifact_location: stored.location.clone(),
    };
    let job = match state.store.create(new_job).await {
        Ok(job) => job,
        Err(e) => {
            if let Err(cleanup) = state.artifacts.remove(&stored.location).await {
                tracing::warn!(error = %cleanup, "Failed to remove orphaned artifact");
            }
            return Err(e.into());
        }
    };

    slot.send(DispatchedJob {
        job_id: job.id,
        artifact_path: stored.path,
    });

    tracing::info!(
        job_id = %job.id,
        user_id = user.user_id,
        file_name = %job.artifact_name,
        size = data.len(),
        "Upload accepted",
    );

    Ok(Json(UploadAccepted {
        upload_id: job.id,
        message: "File uploaded, analysis started",
    }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/uploads/{id}
///
/// Current state of one upload. Returns 400 for a malformed id and 404 when
/// the upload does not exist or belongs to someone else.
pub async fn get_upload(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<UploadStatus>> {
    let id = parse_job_id(&raw_id)
        .ok_or_else(|| CoreError::Validation(format!("Invalid upload id '{raw_id}'")))?;

    let status = if user.is_admin() {
        let elevated = state.store.get_elevated(id).await?;
        UploadStatus::new(elevated.job, elevated.owner)
    } else {
        UploadStatus::new(state.store.get(id, user.user_id).await?, None)
    };

    Ok(Json(status))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/uploads
///
/// The caller's own uploads, most recent first.
pub async fn list_uploads(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<UploadSummary>>> {
    let jobs = state.store.list_by_owner(user.user_id).await?;
    Ok(Json(jobs.into_iter().map(UploadSummary::from).collect()))
}
