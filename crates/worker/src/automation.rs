//! The opaque task body a worker executes once it owns a job.
//!
//! Browser mechanics live behind `AutomationTask`; the runtime only knows
//! that each position × location combination is one bounded step, between
//! which it is safe to pause or abandon.

use async_trait::async_trait;
use jobbot_domain::jobs::Job;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    /// This combination cannot be processed (e.g. no applicable postings);
    /// the job moves on to the next one.
    #[error("Combination skipped: {0}")]
    Skipped(String),

    /// Unrecoverable failure; the job transitions to FAILED with this
    /// message.
    #[error("{0}")]
    Fatal(String),
}

/// One automation step per position × location combination.
///
/// Implementations must not block uninterruptibly: external calls inside a
/// step are expected to carry their own timeouts, and the runtime
/// additionally bounds the whole step so control stays responsive.
#[async_trait]
pub trait AutomationTask: Send + Sync {
    async fn apply(&self, job: &Job, position: &str, location: &str) -> Result<(), TaskError>;
}

/// Stand-in task used by the binary when no real automation is wired up.
/// Sleeps for a fixed delay per combination and succeeds.
pub struct DryRunAutomation {
    step_delay: Duration,
}

impl DryRunAutomation {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

impl Default for DryRunAutomation {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl AutomationTask for DryRunAutomation {
    async fn apply(&self, _job: &Job, position: &str, location: &str) -> Result<(), TaskError> {
        tracing::info!(position, location, "Dry-run application step");
        tokio::time::sleep(self.step_delay).await;
        Ok(())
    }
}
