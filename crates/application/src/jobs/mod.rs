mod cancel;
mod pause;
mod queries;
mod submit;

pub use cancel::{CancelJobRequest, CancelJobResponse, CancelJobUseCase};
pub use pause::{PauseJobRequest, PauseJobResponse, PauseJobUseCase};
pub use queries::GetJobUseCase;
pub use submit::{SubmitJobRequest, SubmitJobResponse, SubmitJobUseCase};

use jobbot_domain::error::{DomainError, Result};
use jobbot_domain::store::JobStore;
use jobbot_shared::JobId;
use std::sync::Arc;

/// Attempts before giving up on a compare-and-set loop. Conflicts are rare
/// (one owner plus the control API), so a small bound is enough.
pub(crate) const MAX_CAS_RETRIES: usize = 3;

/// Resolves the job a control request addresses: an explicit id, or the
/// caller's most recent job when omitted (single-tenant convenience).
pub(crate) async fn resolve_target(
    store: &Arc<dyn JobStore>,
    job_id: Option<JobId>,
) -> Result<JobId> {
    match job_id {
        Some(id) => Ok(id),
        None => store
            .find_most_recent()
            .await?
            .map(|job| job.id)
            .ok_or(DomainError::NoRecentJob),
    }
}
