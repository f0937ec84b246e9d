//! In-process [`JobStore`] backed by a lock-protected map.
//!
//! Same semantics as the Postgres store; used by tests and local runs
//! without a database. Contents do not survive a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{JobStore, StoreError};
use crate::analysis::AnalysisResult;
use crate::job::{ElevatedJob, Job, JobState, NewJob, OwnerProfile};
use crate::types::{new_job_id, DbId, JobId};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    owners: RwLock<HashMap<DbId, OwnerProfile>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register display fields for an owner, standing in for the account service.
    pub async fn register_owner(&self, owner_id: DbId, profile: OwnerProfile) {
        self.owners.write().await.insert(owner_id, profile);
    }

    /// Apply a guarded transition under the write lock.
    async fn transition(
        &self,
        id: JobId,
        to: JobState,
        apply: impl FnOnce(&mut Job),
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !job.state.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.state,
                to,
            });
        }
        job.state = to;
        job.updated_at = chrono::Utc::now();
        apply(job);
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, input: NewJob) -> Result<Job, StoreError> {
        let now = chrono::Utc::now();
        let job = Job {
            id: new_job_id(),
            owner_id: input.owner_id,
            artifact_name: input.artifact_name,
            artifact_location: input.artifact_location,
            state: JobState::Created,
            result: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId, requesting_owner: DbId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .filter(|job| job.owner_id == requesting_owner)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn get_elevated(&self, id: JobId) -> Result<ElevatedJob, StoreError> {
        let job = self
            .jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;
        let owner = self.owners.read().await.get(&job.owner_id).cloned();
        Ok(ElevatedJob { job, owner })
    }

    async fn set_processing(&self, id: JobId) -> Result<(), StoreError> {
        self.transition(id, JobState::Processing, |_| {}).await
    }

    async fn set_completed(&self, id: JobId, result: &AnalysisResult) -> Result<(), StoreError> {
        let result = result.clone();
        self.transition(id, JobState::Completed, move |job| {
            job.result = Some(result);
        })
        .await
    }

    async fn set_failed(&self, id: JobId, reason: &str) -> Result<(), StoreError> {
        self.transition(id, JobState::Failed, |job| {
            job.failure_reason = Some(reason.to_string());
        })
        .await
    }

    async fn list_by_owner(&self, owner: DbId) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.owner_id == owner)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn fail_interrupted(&self, reason: &str) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().await;
        let now = chrono::Utc::now();
        let mut moved = 0;
        for job in jobs.values_mut().filter(|j| !j.state.is_terminal()) {
            job.state = JobState::Failed;
            job.failure_reason = Some(reason.to_string());
            job.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;

    use super::*;
    use crate::analysis::RiskLevel;

    fn new_job(owner_id: DbId, name: &str) -> NewJob {
        NewJob {
            owner_id,
            artifact_name: name.to_string(),
            artifact_location: format!("0-{name}"),
        }
    }

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            document_type: "NDA".into(),
            document_type_confidence: 91.0,
            overall_risk: RiskLevel::Medium,
            risk_percentage: 42.0,
            clauses: vec![],
        }
    }

    #[tokio::test]
    async fn create_starts_in_created_state() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job(7, "contract.pdf")).await.unwrap();
        assert_eq!(job.state, JobState::Created);
        assert_eq!(job.artifact_name, "contract.pdf");
        assert!(job.is_consistent());
        assert_eq!(store.get(job.id, 7).await.unwrap(), job);
    }

    #[tokio::test]
    async fn get_hides_other_owners_jobs() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job(1, "a.pdf")).await.unwrap();
        assert_matches!(store.get(job.id, 2).await, Err(StoreError::NotFound(id)) if id == job.id);
        assert_matches!(
            store.get(new_job_id(), 1).await,
            Err(StoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn elevated_read_sees_any_job_with_owner_fields() {
        let store = MemoryJobStore::new();
        store
            .register_owner(
                1,
                OwnerProfile {
                    name: Some("Ada".into()),
                    email: Some("ada@example.com".into()),
                },
            )
            .await;
        let job = store.create(new_job(1, "a.pdf")).await.unwrap();
        let orphan = store.create(new_job(99, "b.pdf")).await.unwrap();

        let elevated = store.get_elevated(job.id).await.unwrap();
        assert_eq!(elevated.job.id, job.id);
        assert_eq!(elevated.owner.unwrap().name.as_deref(), Some("Ada"));

        let elevated = store.get_elevated(orphan.id).await.unwrap();
        assert!(elevated.owner.is_none());
    }

    #[tokio::test]
    async fn full_lifecycle_to_completed() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job(1, "a.pdf")).await.unwrap();

        store.set_processing(job.id).await.unwrap();
        let processing = store.get(job.id, 1).await.unwrap();
        assert_eq!(processing.state, JobState::Processing);
        assert!(processing.is_consistent());

        store.set_completed(job.id, &sample_result()).await.unwrap();
        let done = store.get(job.id, 1).await.unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.result, Some(sample_result()));
        assert!(done.is_consistent());
    }

    #[tokio::test]
    async fn completion_from_created_is_rejected() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job(1, "a.pdf")).await.unwrap();
        assert_matches!(
            store.set_completed(job.id, &sample_result()).await,
            Err(StoreError::InvalidTransition {
                from: JobState::Created,
                to: JobState::Completed,
                ..
            })
        );
        assert_eq!(store.get(job.id, 1).await.unwrap().state, JobState::Created);
    }

    #[tokio::test]
    async fn terminal_job_is_frozen() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job(1, "a.pdf")).await.unwrap();
        store.set_processing(job.id).await.unwrap();
        store.set_failed(job.id, "boom").await.unwrap();

        assert!(store.set_processing(job.id).await.is_err());
        assert!(store.set_completed(job.id, &sample_result()).await.is_err());
        assert!(store.set_failed(job.id, "again").await.is_err());

        let job = store.get(job.id, 1).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn unknown_job_transition_is_not_found() {
        let store = MemoryJobStore::new();
        assert_matches!(
            store.set_processing(new_job_id()).await,
            Err(StoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn list_is_scoped_and_most_recent_first() {
        let store = MemoryJobStore::new();
        let first = store.create(new_job(1, "first.pdf")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.create(new_job(2, "other.pdf")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create(new_job(1, "second.pdf")).await.unwrap();

        let listed = store.list_by_owner(1).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(store.list_by_owner(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_interrupted_only_touches_open_jobs() {
        let store = MemoryJobStore::new();
        let created = store.create(new_job(1, "a.pdf")).await.unwrap();
        let processing = store.create(new_job(1, "b.pdf")).await.unwrap();
        let done = store.create(new_job(1, "c.pdf")).await.unwrap();
        store.set_processing(processing.id).await.unwrap();
        store.set_processing(done.id).await.unwrap();
        store.set_completed(done.id, &sample_result()).await.unwrap();

        let moved = store.fail_interrupted("restart").await.unwrap();
        assert_eq!(moved, 2);

        for id in [created.id, processing.id] {
            let job = store.get(id, 1).await.unwrap();
            assert_eq!(job.state, JobState::Failed);
            assert_eq!(job.failure_reason.as_deref(), Some("restart"));
        }
        assert_eq!(store.get(done.id, 1).await.unwrap().state, JobState::Completed);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Processing,
        Complete,
        Fail,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Processing), Just(Op::Complete), Just(Op::Fail)]
    }

    proptest! {
        #[test]
        fn no_operation_sequence_leaves_a_terminal_state(ops in proptest::collection::vec(op_strategy(), 1..12)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = MemoryJobStore::new();
                let job = store.create(new_job(1, "p.pdf")).await.unwrap();
                let mut previous = JobState::Created;

                for op in ops {
                    let outcome = match op {
                        Op::Processing => store.set_processing(job.id).await,
                        Op::Complete => store.set_completed(job.id, &sample_result()).await,
                        Op::Fail => store.set_failed(job.id, "failed").await,
                    };
                    let current = store.get(job.id, 1).await.unwrap();

                    if previous.is_terminal() {
                        prop_assert!(outcome.is_err());
                        prop_assert_eq!(current.state, previous);
                    }
                    if outcome.is_ok() {
                        prop_assert!(previous.can_transition_to(current.state));
                    } else {
                        prop_assert_eq!(current.state, previous);
                    }
                    prop_assert!(current.is_consistent());
                    previous = current.state;
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
