//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

use clauselens_core::job::JobState;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                $( if id == $val { return Some(Self::$variant); } )+
                None
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Analysis job lifecycle status (`job_statuses`).
    JobStatus {
        Created = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

impl From<JobState> for JobStatus {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Created => JobStatus::Created,
            JobState::Processing => JobStatus::Processing,
            JobState::Completed => JobStatus::Completed,
            JobState::Failed => JobStatus::Failed,
        }
    }
}

impl From<JobStatus> for JobState {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Created => JobState::Created,
            JobStatus::Processing => JobState::Processing,
            JobStatus::Completed => JobState::Completed,
            JobStatus::Failed => JobState::Failed,
        }
    }
}

/// Status IDs from which a job may move to `next`.
pub fn allowed_source_ids(next: JobState) -> Vec<StatusId> {
    JobState::allowed_sources(next)
        .into_iter()
        .map(|s| JobStatus::from(s).id())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_seed_order() {
        assert_eq!(JobStatus::Created.id(), 1);
        assert_eq!(JobStatus::Processing.id(), 2);
        assert_eq!(JobStatus::Completed.id(), 3);
        assert_eq!(JobStatus::Failed.id(), 4);
    }

    #[test]
    fn every_state_round_trips_through_its_id() {
        for state in JobState::ALL {
            let id = JobStatus::from(state).id();
            let back = JobStatus::from_id(id).map(JobState::from);
            assert_eq!(back, Some(state));
        }
        assert_eq!(JobStatus::from_id(0), None);
        assert_eq!(JobStatus::from_id(9), None);
    }

    #[test]
    fn guarded_updates_use_forward_sources_only() {
        assert_eq!(allowed_source_ids(JobState::Processing), vec![1]);
        assert_eq!(allowed_source_ids(JobState::Completed), vec![2]);
        assert_eq!(allowed_source_ids(JobState::Failed), vec![1, 2]);
    }
}
