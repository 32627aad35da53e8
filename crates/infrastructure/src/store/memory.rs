//! In-memory job store.
//!
//! Backs tests and single-replica deployments. Implements the same
//! conditional-update contract as the PostgreSQL store, so races exercised
//! against it behave like production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobbot_domain::error::{DomainError, Result};
use jobbot_domain::jobs::Job;
use jobbot_domain::store::JobStore;
use jobbot_shared::{JobId, JobState, WorkerId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).cloned())
    }

    async fn find_by_state(&self, state: &JobState) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| job.state == *state)
            .cloned()
            .collect())
    }

    async fn find_most_recent(&self) -> Result<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .max_by_key(|job| job.created_at)
            .cloned())
    }

    async fn update(&self, job: &Job) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get(&job.id)
            .ok_or_else(|| DomainError::JobNotFound {
                job_id: job.id.clone(),
            })?;

        if stored.version != job.version {
            return Err(DomainError::VersionConflict {
                job_id: job.id.clone(),
            });
        }

        let mut updated = job.clone();
        updated.version += 1;
        jobs.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn claim(&self, job_id: &JobId, worker: &WorkerId) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get(job_id).ok_or_else(|| DomainError::ClaimLost {
            job_id: job_id.clone(),
        })?;

        if stored.state != JobState::Pending || stored.owner.is_some() {
            return Err(DomainError::ClaimLost {
                job_id: job_id.clone(),
            });
        }

        let mut claimed = stored.clone();
        claimed
            .claim(worker.clone())
            .map_err(|_| DomainError::ClaimLost {
                job_id: job_id.clone(),
            })?;
        claimed.version += 1;
        jobs.insert(claimed.id.clone(), claimed.clone());
        Ok(claimed)
    }

    async fn find_stale_owned(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut stale: Vec<Job> = jobs
            .values()
            .filter(|job| job.state.is_owned() && job.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|job| job.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut stale: Vec<Job> = jobs
            .values()
            .filter(|job| job.state == JobState::Pending && job.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|job| job.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }
}
