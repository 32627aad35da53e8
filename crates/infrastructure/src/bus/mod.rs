mod memory;
mod nats;

pub use memory::InMemoryCommandBus;
pub use nats::{NatsCommandBus, NatsConfig};
