//! Command bus message envelopes.
//!
//! Envelopes carry identifiers only; job parameters live in the job store
//! and are fetched by the worker after claiming.

use chrono::{DateTime, Utc};
use jobbot_shared::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instructs some worker replica to claim and run a pending job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub job_id: JobId,
    pub issued_at: DateTime<Utc>,
}

impl DispatchMessage {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            issued_at: Utc::now(),
        }
    }
}

/// The two out-of-band commands an operator can aim at a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    Pause,
    Cancel,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKind::Pause => write!(f, "PAUSE"),
            ControlKind::Cancel => write!(f, "CANCEL"),
        }
    }
}

/// A pause or cancel request targeted at a specific job.
///
/// Signals are consumed at most once by the owning worker and then
/// discarded; the job record is the only durable representation of their
/// effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSignal {
    pub job_id: JobId,
    pub kind: ControlKind,
    pub issued_at: DateTime<Utc>,
}

impl ControlSignal {
    pub fn pause(job_id: JobId) -> Self {
        Self {
            job_id,
            kind: ControlKind::Pause,
            issued_at: Utc::now(),
        }
    }

    pub fn cancel(job_id: JobId) -> Self {
        Self {
            job_id,
            kind: ControlKind::Cancel,
            issued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization_roundtrip() {
        let signal = ControlSignal::cancel(JobId::new());
        let bytes = serde_json::to_vec(&signal).unwrap();
        let decoded: ControlSignal = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, signal);
    }

    #[test]
    fn test_control_kind_display() {
        assert_eq!(ControlKind::Pause.to_string(), "PAUSE");
        assert_eq!(ControlKind::Cancel.to_string(), "CANCEL");
    }
}
