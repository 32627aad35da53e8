use jobbot_domain::error::{DomainError, Result};
use jobbot_domain::jobs::Job;
use jobbot_domain::store::JobStore;
use jobbot_shared::JobId;
use std::sync::Arc;

/// Read side: fetch one job record for polling callers
pub struct GetJobUseCase {
    store: Arc<dyn JobStore>,
}

impl GetJobUseCase {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self, job_id: JobId) -> Result<Job> {
        self.store
            .find_by_id(&job_id)
            .await?
            .ok_or(DomainError::JobNotFound { job_id })
    }
}
