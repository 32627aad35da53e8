use super::{resolve_target, MAX_CAS_RETRIES};
use chrono::Duration;
use jobbot_domain::command_bus::CommandBus;
use jobbot_domain::error::{DomainError, Result};
use jobbot_domain::messages::ControlSignal;
use jobbot_domain::store::JobStore;
use jobbot_shared::JobId;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Suspends a running job for a caller-supplied window.
///
/// Writes `pause_until` to the record (the authoritative side) and then
/// publishes a PAUSE signal so the owning worker reacts without waiting
/// for its next checkpoint poll. Only legal while the job is RUNNING.
pub struct PauseJobUseCase {
    store: Arc<dyn JobStore>,
    bus: Arc<dyn CommandBus>,
}

#[derive(Debug, Clone)]
pub struct PauseJobRequest {
    /// Target job; the caller's most recent job when omitted
    pub job_id: Option<JobId>,
    pub duration_secs: u64,
}

#[derive(Debug, Clone)]
pub struct PauseJobResponse {
    pub job_id: JobId,
    pub paused_for_secs: u64,
}

impl PauseJobUseCase {
    pub fn new(store: Arc<dyn JobStore>, bus: Arc<dyn CommandBus>) -> Self {
        Self { store, bus }
    }

    #[instrument(skip(self, request))]
    pub async fn execute(&self, request: PauseJobRequest) -> Result<PauseJobResponse> {
        let job_id = resolve_target(&self.store, request.job_id).await?;
        let duration = Duration::seconds(request.duration_secs as i64);

        for _ in 0..MAX_CAS_RETRIES {
            let mut job = self
                .store
                .find_by_id(&job_id)
                .await?
                .ok_or_else(|| DomainError::JobNotFound {
                    job_id: job_id.clone(),
                })?;

            job.request_pause(duration)?;

            match self.store.update(&job).await {
                Ok(_) => {
                    // Best effort: the record already carries the deadline,
                    // the signal only removes polling latency.
                    if let Err(e) = self
                        .bus
                        .publish_control(&ControlSignal::pause(job_id.clone()))
                        .await
                    {
                        warn!(%job_id, "Failed to publish pause signal: {}", e);
                    }

                    info!(%job_id, duration_secs = request.duration_secs, "Pause accepted");
                    return Ok(PauseJobResponse {
                        job_id,
                        paused_for_secs: request.duration_secs,
                    });
                }
                Err(DomainError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(DomainError::VersionConflict { job_id })
    }
}
