//! Centralized command bus subject constants
//!
//! Single source of truth for NATS subject and stream names, preventing
//! mismatches between publishers and consumers.
//!
//! ## Naming convention
//! - Dispatch: `jobbot.jobs.dispatch` (work queue, one consumer group)
//! - Control: `jobbot.control.{job_id}` (one subject per in-flight job)

use crate::ids::JobId;

/// Subject prefix for all JobBot messages
pub const SUBJECT_PREFIX: &str = "jobbot";

/// Subject carrying dispatch messages for pending jobs
pub const DISPATCH_SUBJECT: &str = "jobbot.jobs.dispatch";

/// JetStream stream backing the dispatch work queue
pub const DISPATCH_STREAM: &str = "JOBBOT_DISPATCH";

/// Durable consumer shared by all worker replicas
pub const DISPATCH_CONSUMER: &str = "dispatch-workers";

/// Control signal subject for a specific job
pub fn control_subject(job_id: &JobId) -> String {
    format!("{}.control.{}", SUBJECT_PREFIX, job_id)
}
