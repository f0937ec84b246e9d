//! Analysis job model and lifecycle state machine.
//!
//! ```text
//! Created --dispatch--> Processing --worker ok--> Completed
//!    |                       \
//!    |                        --worker failed--> Failed
//!    --could not start----------------------->  Failed
//! ```
//!
//! `Completed` and `Failed` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::types::{DbId, JobId, Timestamp};

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Created,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether a job in `self` may move to `next`.
    ///
    /// Only forward moves are allowed. `Created -> Failed` covers jobs that
    /// never reached a worker; a result can only be recorded after
    /// `Processing`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Created, JobState::Processing)
                | (JobState::Created, JobState::Failed)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }

    /// States from which `next` is reachable in one step.
    pub fn allowed_sources(next: JobState) -> Vec<JobState> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted analysis job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: DbId,
    pub artifact_name: String,
    pub artifact_location: String,
    pub state: JobState,
    /// Present only when `state == Completed`.
    pub result: Option<AnalysisResult>,
    /// Present only when `state == Failed`.
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Check the result/reason invariants for the current state.
    pub fn is_consistent(&self) -> bool {
        match self.state {
            JobState::Created | JobState::Processing => {
                self.result.is_none() && self.failure_reason.is_none()
            }
            JobState::Completed => self.result.is_some() && self.failure_reason.is_none(),
            JobState::Failed => self.result.is_none() && self.failure_reason.is_some(),
        }
    }
}

/// Input for creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_id: DbId,
    pub artifact_name: String,
    pub artifact_location: String,
}

/// Display fields for a job owner, supplied by the account service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerProfile {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A job read through the elevated (admin) path, with owner details joined in.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevatedJob {
    pub job: Job,
    pub owner: Option<OwnerProfile>,
}
