use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle states of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Paused,
    Cancelled,
    Succeeded,
    Failed,
}

impl JobState {
    /// Validates a state transition against the domain state machine.
    ///
    /// Valid transitions:
    /// - Pending → Running, Cancelled
    /// - Running → Paused, Succeeded, Failed, Cancelled
    /// - Paused → Running, Cancelled
    /// - Succeeded, Failed, Cancelled → (terminal, no outgoing transitions)
    pub fn can_transition_to(&self, new_state: &JobState) -> bool {
        match (self, new_state) {
            // Same state is not a transition
            (s, n) if s == n => false,

            (JobState::Pending, JobState::Running) => true,
            (JobState::Pending, JobState::Cancelled) => true,

            (JobState::Running, JobState::Paused) => true,
            (JobState::Running, JobState::Succeeded) => true,
            (JobState::Running, JobState::Failed) => true,
            (JobState::Running, JobState::Cancelled) => true,

            // A paused job resumes before it can complete
            (JobState::Paused, JobState::Running) => true,
            (JobState::Paused, JobState::Cancelled) => true,

            _ => false,
        }
    }

    /// Returns true if the state accepts no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// Returns true if some worker currently holds the job
    pub fn is_owned(&self) -> bool {
        matches!(self, JobState::Running | JobState::Paused)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Paused => write!(f, "PAUSED"),
            JobState::Cancelled => write!(f, "CANCELLED"),
            JobState::Succeeded => write!(f, "SUCCEEDED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            "PAUSED" => Ok(JobState::Paused),
            "CANCELLED" => Ok(JobState::Cancelled),
            "SUCCEEDED" => Ok(JobState::Succeeded),
            "FAILED" => Ok(JobState::Failed),
            _ => Err(format!("Invalid JobState: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_from_str() {
        assert_eq!("PENDING".parse::<JobState>().unwrap(), JobState::Pending);
        assert_eq!("RUNNING".parse::<JobState>().unwrap(), JobState::Running);
        assert_eq!("PAUSED".parse::<JobState>().unwrap(), JobState::Paused);
        assert_eq!(
            "CANCELLED".parse::<JobState>().unwrap(),
            JobState::Cancelled
        );
        assert_eq!(
            "SUCCEEDED".parse::<JobState>().unwrap(),
            JobState::Succeeded
        );
        assert_eq!("FAILED".parse::<JobState>().unwrap(), JobState::Failed);

        assert!("INVALID".parse::<JobState>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Paused,
            JobState::Cancelled,
            JobState::Succeeded,
            JobState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
    }

    #[test]
    fn test_valid_transitions() {
        assert!(JobState::Pending.can_transition_to(&JobState::Running));
        assert!(JobState::Pending.can_transition_to(&JobState::Cancelled));
        assert!(JobState::Running.can_transition_to(&JobState::Paused));
        assert!(JobState::Running.can_transition_to(&JobState::Succeeded));
        assert!(JobState::Running.can_transition_to(&JobState::Failed));
        assert!(JobState::Running.can_transition_to(&JobState::Cancelled));
        assert!(JobState::Paused.can_transition_to(&JobState::Running));
        assert!(JobState::Paused.can_transition_to(&JobState::Cancelled));
    }

    #[test]
    fn test_invalid_transitions() {
        // Pending cannot complete without running first
        assert!(!JobState::Pending.can_transition_to(&JobState::Succeeded));
        assert!(!JobState::Pending.can_transition_to(&JobState::Failed));
        assert!(!JobState::Pending.can_transition_to(&JobState::Paused));

        // Paused must resume before completing
        assert!(!JobState::Paused.can_transition_to(&JobState::Succeeded));
        assert!(!JobState::Paused.can_transition_to(&JobState::Failed));

        // Self transitions are invalid
        assert!(!JobState::Running.can_transition_to(&JobState::Running));
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        let all = [
            JobState::Pending,
            JobState::Running,
            JobState::Paused,
            JobState::Cancelled,
            JobState::Succeeded,
            JobState::Failed,
        ];
        for terminal in [JobState::Succeeded, JobState::Failed, JobState::Cancelled] {
            assert!(terminal.is_terminal());
            for target in &all {
                assert!(
                    !terminal.can_transition_to(target),
                    "{} must not transition to {}",
                    terminal,
                    target
                );
            }
        }
    }

    #[test]
    fn test_owned_states() {
        assert!(JobState::Running.is_owned());
        assert!(JobState::Paused.is_owned());
        assert!(!JobState::Pending.is_owned());
        assert!(!JobState::Succeeded.is_owned());
    }
}
