//! The job store port.
//!
//! Every implementation must make each write atomic for a single job and
//! must refuse transitions that [`JobState::can_transition_to`] rejects.
//! Ownership mismatches are reported as [`StoreError::NotFound`] so that
//! callers cannot probe for other tenants' job ids.

mod memory;

pub use memory::MemoryJobStore;

use async_trait::async_trait;

use crate::analysis::AnalysisResult;
use crate::job::{ElevatedJob, Job, JobState, NewJob};
use crate::types::{DbId, JobId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("job store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in the `Created` state.
    async fn create(&self, input: NewJob) -> Result<Job, StoreError>;

    /// Read a job on behalf of `requesting_owner`.
    async fn get(&self, id: JobId, requesting_owner: DbId) -> Result<Job, StoreError>;

    /// Read any job regardless of owner, joining owner display fields.
    async fn get_elevated(&self, id: JobId) -> Result<ElevatedJob, StoreError>;

    async fn set_processing(&self, id: JobId) -> Result<(), StoreError>;

    async fn set_completed(&self, id: JobId, result: &AnalysisResult) -> Result<(), StoreError>;

    async fn set_failed(&self, id: JobId, reason: &str) -> Result<(), StoreError>;

    /// All jobs of `owner`, most recent first.
    async fn list_by_owner(&self, owner: DbId) -> Result<Vec<Job>, StoreError>;

    /// Fail every job that is still `Created` or `Processing`.
    ///
    /// Used once at startup: no worker attempt from a previous process can
    /// still be running. Returns the number of jobs moved.
    async fn fail_interrupted(&self, reason: &str) -> Result<u64, StoreError>;
}
