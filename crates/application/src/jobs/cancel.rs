use super::{resolve_target, MAX_CAS_RETRIES};
use jobbot_domain::command_bus::CommandBus;
use jobbot_domain::error::{DomainError, Result};
use jobbot_domain::messages::ControlSignal;
use jobbot_domain::store::JobStore;
use jobbot_shared::{JobId, JobState};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Requests that a job stop soon.
///
/// The CANCELLED write happens here, unconditionally for any non-terminal
/// state; the owning worker observes it at its next checkpoint and
/// abandons work. The API never waits for that acknowledgment.
pub struct CancelJobUseCase {
    store: Arc<dyn JobStore>,
    bus: Arc<dyn CommandBus>,
}

#[derive(Debug, Clone)]
pub struct CancelJobRequest {
    /// Target job; the caller's most recent job when omitted
    pub job_id: Option<JobId>,
}

#[derive(Debug, Clone)]
pub struct CancelJobResponse {
    pub job_id: JobId,
    pub previous_state: JobState,
}

impl CancelJobUseCase {
    pub fn new(store: Arc<dyn JobStore>, bus: Arc<dyn CommandBus>) -> Self {
        Self { store, bus }
    }

    #[instrument(skip(self, request))]
    pub async fn execute(&self, request: CancelJobRequest) -> Result<CancelJobResponse> {
        let job_id = resolve_target(&self.store, request.job_id).await?;

        for _ in 0..MAX_CAS_RETRIES {
            let mut job = self
                .store
                .find_by_id(&job_id)
                .await?
                .ok_or_else(|| DomainError::JobNotFound {
                    job_id: job_id.clone(),
                })?;

            let previous_state = job.state;
            job.cancel()?;

            match self.store.update(&job).await {
                Ok(_) => {
                    if let Err(e) = self
                        .bus
                        .publish_control(&ControlSignal::cancel(job_id.clone()))
                        .await
                    {
                        warn!(%job_id, "Failed to publish cancel signal: {}", e);
                    }

                    info!(%job_id, %previous_state, "Cancel accepted");
                    return Ok(CancelJobResponse {
                        job_id,
                        previous_state,
                    });
                }
                Err(DomainError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(DomainError::VersionConflict { job_id })
    }
}
