//! Application layer: one use case per control plane operation.
//!
//! Use cases hold the store and bus ports, enforce the write ordering
//! (durability before dispatch) and hide the compare-and-set retry loops
//! from the HTTP layer.

pub mod jobs;

pub use jobs::{
    CancelJobRequest, CancelJobResponse, CancelJobUseCase, GetJobUseCase, PauseJobRequest,
    PauseJobResponse, PauseJobUseCase, SubmitJobRequest, SubmitJobResponse, SubmitJobUseCase,
};
