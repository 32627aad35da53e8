// Job lifecycle bounded context
// Owns the Job aggregate and every legal mutation of it

use crate::error::{DomainError, Result};
use chrono::{DateTime, Duration, Utc};
use jobbot_shared::{CorrelationId, JobId, JobState, WorkerId};
use serde::{Deserialize, Serialize};

/// What a submitted job searches for: every position is applied to in
/// every location, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpec {
    /// Search terms, e.g. "backend engineer"
    pub positions: Vec<String>,
    /// Target locations, e.g. "remote"
    pub locations: Vec<String>,
}

impl SearchSpec {
    pub fn new(positions: Vec<String>, locations: Vec<String>) -> Self {
        Self {
            positions,
            locations,
        }
    }

    /// Boundary validation, early-return style
    pub fn validate(&self) -> Result<()> {
        if self.positions.is_empty() {
            return Err(DomainError::InvalidJobSpec {
                field: "positions".to_string(),
                reason: "at least one position is required".to_string(),
            });
        }

        if self.locations.is_empty() {
            return Err(DomainError::InvalidJobSpec {
                field: "locations".to_string(),
                reason: "at least one location is required".to_string(),
            });
        }

        if self.positions.iter().any(|p| p.trim().is_empty()) {
            return Err(DomainError::InvalidJobSpec {
                field: "positions".to_string(),
                reason: "positions cannot be blank".to_string(),
            });
        }

        if self.locations.iter().any(|l| l.trim().is_empty()) {
            return Err(DomainError::InvalidJobSpec {
                field: "locations".to_string(),
                reason: "locations cannot be blank".to_string(),
            });
        }

        Ok(())
    }

    /// Number of position × location combinations the worker will visit
    pub fn combinations(&self) -> usize {
        self.positions.len() * self.locations.len()
    }
}

/// The Job aggregate.
///
/// Mutations go through the methods below, each of which validates the
/// transition against `JobState::can_transition_to`. The `version` counter
/// is the optimistic-concurrency token: stores accept a write only when the
/// caller read the version they are replacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub spec: SearchSpec,
    pub state: JobState,
    /// Worker currently holding the job, empty when unowned
    pub owner: Option<WorkerId>,
    /// Optimistic concurrency counter, incremented by the store on every
    /// accepted write
    pub version: u64,
    /// Completed position × location combinations
    pub applied: u32,
    /// While set and in the future, the owning worker suspends work
    pub pause_until: Option<DateTime<Utc>>,
    /// Set only when state is FAILED
    pub error_message: Option<String>,
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
    /// Advances on every accepted write; doubles as the ownership lease
    /// heartbeat while the job is RUNNING or PAUSED
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a new pending job after validating the spec
    pub fn new(spec: SearchSpec) -> Result<Self> {
        spec.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: JobId::new(),
            spec,
            state: JobState::Pending,
            owner: None,
            version: 0,
            applied: 0,
            pause_until: None,
            error_message: None,
            correlation_id: CorrelationId::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn transition_to(&mut self, new_state: JobState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state,
                to: new_state,
            });
        }
        self.state = new_state;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Takes ownership for a worker replica: PENDING and unowned → RUNNING.
    ///
    /// Duplicate dispatch messages land here and fail the transition check,
    /// which the store surfaces as a lost claim.
    pub fn claim(&mut self, worker: WorkerId) -> Result<()> {
        if let Some(owner) = &self.owner {
            return Err(DomainError::AlreadyOwned {
                job_id: self.id.clone(),
                owner: owner.clone(),
            });
        }
        self.transition_to(JobState::Running)?;
        self.owner = Some(worker);
        Ok(())
    }

    /// Records an operator pause request: legal only while RUNNING.
    /// Last accepted write wins across concurrent pause calls.
    pub fn request_pause(&mut self, duration: Duration) -> Result<()> {
        if self.state != JobState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state,
                to: JobState::Paused,
            });
        }
        self.pause_until = Some(Utc::now() + duration);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Worker-side transition into PAUSED once a pause deadline is observed
    pub fn pause(&mut self) -> Result<()> {
        self.transition_to(JobState::Paused)
    }

    /// Worker-side transition back to RUNNING after the deadline elapses
    pub fn resume(&mut self) -> Result<()> {
        self.transition_to(JobState::Running)?;
        self.pause_until = None;
        Ok(())
    }

    /// Terminal: task body finished every combination
    pub fn complete(&mut self) -> Result<()> {
        self.transition_to(JobState::Succeeded)?;
        self.finish();
        Ok(())
    }

    /// Terminal: unrecoverable task error, absorbed into the record
    pub fn fail(&mut self, error_message: impl Into<String>) -> Result<()> {
        self.transition_to(JobState::Failed)?;
        self.error_message = Some(error_message.into());
        self.finish();
        Ok(())
    }

    /// Terminal: operator cancellation, legal from PENDING, RUNNING and
    /// PAUSED
    pub fn cancel(&mut self) -> Result<()> {
        self.transition_to(JobState::Cancelled)?;
        self.finish();
        Ok(())
    }

    /// Crash-recovery reset used by the reconciliation sweep: an owned job
    /// whose lease expired goes back to PENDING for re-dispatch.
    ///
    /// Deliberately outside the regular transition graph: it undoes a claim
    /// whose worker is presumed dead, never a terminal state.
    pub fn release_to_pending(&mut self) -> Result<()> {
        if !self.state.is_owned() {
            return Err(DomainError::InvalidStateTransition {
                from: self.state,
                to: JobState::Pending,
            });
        }
        self.state = JobState::Pending;
        self.owner = None;
        self.pause_until = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Renews the ownership lease without changing state
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Records one completed position × location combination
    pub fn record_application(&mut self) {
        self.applied += 1;
        self.updated_at = Utc::now();
    }

    /// True when an operator pause deadline is set and still in the future
    pub fn pause_requested(&self, now: DateTime<Utc>) -> bool {
        self.pause_until.map(|until| until > now).unwrap_or(false)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    // Every terminal transition releases ownership and clears the pause
    // deadline (meaningless outside RUNNING/PAUSED).
    fn finish(&mut self) {
        self.owner = None;
        self.pause_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SearchSpec {
        SearchSpec::new(vec!["engineer".to_string()], vec!["remote".to_string()])
    }

    #[test]
    fn test_new_job_starts_pending_and_unowned() {
        let job = Job::new(spec()).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.owner.is_none());
        assert_eq!(job.version, 0);
        assert_eq!(job.applied, 0);
    }

    #[test]
    fn test_empty_positions_rejected() {
        let err = Job::new(SearchSpec::new(vec![], vec!["remote".to_string()])).unwrap_err();
        assert!(matches!(err, DomainError::InvalidJobSpec { field, .. } if field == "positions"));
    }

    #[test]
    fn test_empty_locations_rejected() {
        let err = Job::new(SearchSpec::new(vec!["engineer".to_string()], vec![])).unwrap_err();
        assert!(matches!(err, DomainError::InvalidJobSpec { field, .. } if field == "locations"));
    }

    #[test]
    fn test_blank_entries_rejected() {
        let err = Job::new(SearchSpec::new(
            vec!["  ".to_string()],
            vec!["remote".to_string()],
        ))
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidJobSpec { .. }));
    }

    #[test]
    fn test_claim_sets_owner_and_runs() {
        let mut job = Job::new(spec()).unwrap();
        let worker = WorkerId::new();
        job.claim(worker.clone()).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.owner, Some(worker));
    }

    #[test]
    fn test_claim_of_owned_job_fails() {
        let mut job = Job::new(spec()).unwrap();
        job.claim(WorkerId::new()).unwrap();
        let err = job.clone().claim(WorkerId::new()).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyOwned { .. }));
    }

    #[test]
    fn test_pause_only_while_running() {
        let mut job = Job::new(spec()).unwrap();
        assert!(job.request_pause(Duration::seconds(5)).is_err());

        job.claim(WorkerId::new()).unwrap();
        job.request_pause(Duration::seconds(5)).unwrap();
        assert!(job.pause_requested(Utc::now()));

        job.pause().unwrap();
        assert_eq!(job.state, JobState::Paused);
        // Pausing an already paused job is rejected
        assert!(job.request_pause(Duration::seconds(5)).is_err());
    }

    #[test]
    fn test_resume_clears_pause_deadline() {
        let mut job = Job::new(spec()).unwrap();
        job.claim(WorkerId::new()).unwrap();
        job.request_pause(Duration::seconds(5)).unwrap();
        job.pause().unwrap();
        job.resume().unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(job.pause_until.is_none());
    }

    #[test]
    fn test_terminal_transitions_release_ownership() {
        let mut job = Job::new(spec()).unwrap();
        job.claim(WorkerId::new()).unwrap();
        job.request_pause(Duration::seconds(30)).unwrap();
        job.cancel().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.owner.is_none());
        assert!(job.pause_until.is_none());
    }

    #[test]
    fn test_failed_carries_error_message() {
        let mut job = Job::new(spec()).unwrap();
        job.claim(WorkerId::new()).unwrap();
        job.fail("selector timed out").unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error_message.as_deref(), Some("selector timed out"));
    }

    #[test]
    fn test_terminal_states_reject_further_transitions() {
        let mut job = Job::new(spec()).unwrap();
        job.claim(WorkerId::new()).unwrap();
        job.cancel().unwrap();

        assert!(job.complete().is_err());
        assert!(job.fail("late failure").is_err());
        assert!(job.cancel().is_err());
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[test]
    fn test_paused_job_cannot_complete_without_resuming() {
        let mut job = Job::new(spec()).unwrap();
        job.claim(WorkerId::new()).unwrap();
        job.pause().unwrap();
        assert!(job.complete().is_err());
        job.resume().unwrap();
        job.complete().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
    }

    #[test]
    fn test_release_to_pending_resets_ownership() {
        let mut job = Job::new(spec()).unwrap();
        job.claim(WorkerId::new()).unwrap();
        job.release_to_pending().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.owner.is_none());
    }

    #[test]
    fn test_release_to_pending_rejects_terminal_and_pending() {
        let mut job = Job::new(spec()).unwrap();
        assert!(job.release_to_pending().is_err());

        job.claim(WorkerId::new()).unwrap();
        job.complete().unwrap();
        assert!(job.release_to_pending().is_err());
    }

    #[test]
    fn test_combinations_counts_grid() {
        let spec = SearchSpec::new(
            vec!["a".to_string(), "b".to_string()],
            vec!["x".to_string(), "y".to_string(), "z".to_string()],
        );
        assert_eq!(spec.combinations(), 6);
    }
}
