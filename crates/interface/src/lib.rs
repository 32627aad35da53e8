//! HTTP control API for the JobBot control plane.

mod api;

pub use api::{create_router, AppState};
