mod aggregate;

pub use aggregate::{Job, SearchSpec};
