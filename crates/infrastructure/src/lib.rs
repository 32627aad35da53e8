//! Infrastructure adapters for the JobBot control plane.
//!
//! Concrete implementations of the domain ports: job stores (PostgreSQL
//! and in-memory), command buses (NATS JetStream and in-process), and the
//! ownership lease reconciliation sweep.

pub mod bus;
pub mod reaper;
pub mod store;

pub use bus::{InMemoryCommandBus, NatsCommandBus, NatsConfig};
pub use reaper::{LeaseReaper, LeaseReaperConfig, LeaseReaperResult};
pub use store::{InMemoryJobStore, PostgresJobStore};
