//! Domain model of the JobBot control plane.
//!
//! Owns the `Job` aggregate and its state machine, the bus message
//! envelopes, the error taxonomy, and the ports (`JobStore`, `CommandBus`)
//! that infrastructure implements. No I/O happens in this crate.

pub mod command_bus;
pub mod error;
pub mod jobs;
pub mod messages;
pub mod store;

pub use error::{DomainError, Result};
pub use jobs::{Job, SearchSpec};
pub use messages::{ControlKind, ControlSignal, DispatchMessage};
