use jobbot_domain::command_bus::CommandBus;
use jobbot_domain::error::Result;
use jobbot_domain::jobs::{Job, SearchSpec};
use jobbot_domain::messages::DispatchMessage;
use jobbot_domain::store::JobStore;
use jobbot_shared::JobId;
use std::sync::Arc;
use tracing::{info, instrument};

/// Accepts a job request, makes it durable, then announces it on the bus.
///
/// Ordering is the contract here: the store write must complete before the
/// dispatch message exists, so a worker can never claim a job the store
/// does not know about. A store failure therefore publishes nothing.
pub struct SubmitJobUseCase {
    store: Arc<dyn JobStore>,
    bus: Arc<dyn CommandBus>,
}

#[derive(Debug, Clone)]
pub struct SubmitJobRequest {
    pub positions: Vec<String>,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

impl SubmitJobUseCase {
    pub fn new(store: Arc<dyn JobStore>, bus: Arc<dyn CommandBus>) -> Self {
        Self { store, bus }
    }

    #[instrument(skip(self, request))]
    pub async fn execute(&self, request: SubmitJobRequest) -> Result<SubmitJobResponse> {
        let job = Job::new(SearchSpec::new(request.positions, request.locations))?;
        let job_id = job.id.clone();

        self.store.insert(&job).await?;

        self.bus
            .publish_dispatch(&DispatchMessage::new(job_id.clone()))
            .await?;

        info!(
            %job_id,
            correlation_id = %job.correlation_id,
            combinations = job.spec.combinations(),
            "Job submitted"
        );
        Ok(SubmitJobResponse { job_id })
    }
}
