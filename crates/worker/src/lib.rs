//! Worker runtime for the JobBot control plane.
//!
//! Each replica runs an independent claim loop: pull a dispatch message,
//! claim the referenced job with a conditional store write, then execute
//! the automation task in a cancellable unit of work that checks for
//! pause/cancel at every checkpoint.

pub mod automation;
pub mod config;
pub mod runtime;

pub use automation::{AutomationTask, DryRunAutomation, TaskError};
pub use config::WorkerConfig;
pub use runtime::{RuntimeOptions, WorkerRuntime};
