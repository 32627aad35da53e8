//! Job store port.
//!
//! The store is the single source of truth for job state. Implementations
//! must provide the conditional-update primitives (`update`, `claim`) that
//! make claim and terminal-write races safe without distributed locks.

use crate::error::Result;
use crate::jobs::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobbot_shared::{JobId, JobState, WorkerId};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new job record. The write completes before any dispatch
    /// message may be published for it.
    async fn insert(&self, job: &Job) -> Result<()>;

    async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>>;

    async fn find_by_state(&self, state: &JobState) -> Result<Vec<Job>>;

    /// Most recently submitted job, used to resolve id-less control
    /// requests in single-tenant deployments
    async fn find_most_recent(&self) -> Result<Option<Job>>;

    /// Compare-and-set write: accepted only when the stored version equals
    /// `job.version` (the version the caller read). On success the stored
    /// record carries `version + 1`; the updated record is returned.
    ///
    /// Fails with `VersionConflict` when another writer got there first.
    async fn update(&self, job: &Job) -> Result<Job>;

    /// Atomic claim: PENDING and unowned → RUNNING owned by `worker`.
    ///
    /// Fails with `ClaimLost` when the job is in any other state — the
    /// normal outcome for duplicate dispatch messages and for claims racing
    /// an early cancellation.
    async fn claim(&self, job_id: &JobId, worker: &WorkerId) -> Result<Job>;

    /// Owned jobs (RUNNING or PAUSED) whose lease heartbeat is older than
    /// `older_than`, for the reconciliation sweep. At most `limit` rows.
    async fn find_stale_owned(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>>;

    /// PENDING jobs untouched since `older_than`. These lost their dispatch
    /// message (publish failure, or a consumer that died between ack and
    /// claim) and need re-dispatch.
    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>>;
}
