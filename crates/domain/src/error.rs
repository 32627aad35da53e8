use jobbot_shared::{JobId, JobState, WorkerId};

/// Domain errors
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: JobId },

    #[error("No jobs have been submitted yet")]
    NoRecentJob,

    #[error("Invalid job spec field {field}: {reason}")]
    InvalidJobSpec { field: String, reason: String },

    #[error("Invalid job state transition from {from} to {to}")]
    InvalidStateTransition { from: JobState, to: JobState },

    #[error("Job {job_id} is already owned by worker {owner}")]
    AlreadyOwned { job_id: JobId, owner: WorkerId },

    #[error("Claim lost for job {job_id}")]
    ClaimLost { job_id: JobId },

    #[error("Stale write for job {job_id}: version conflict")]
    VersionConflict { job_id: JobId },

    #[error("Job store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Command bus unavailable: {message}")]
    BusUnavailable { message: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
