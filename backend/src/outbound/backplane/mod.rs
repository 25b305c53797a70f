//! Broker adapters implementing the fan-out [`Backplane`] port.
//!
//! - [`RedisBackplane`]: Redis pub/sub, shared by every process pointed at
//!   the same broker address and channel.
//! - [`InMemoryBackplane`]: a process-local broker for running several
//!   gateways side by side without external infrastructure.
//!
//! [`Backplane`]: crate::domain::ports::Backplane

mod memory;
mod redis_broker;

pub use memory::InMemoryBackplane;
pub use redis_broker::{BrokerConfig, RedisBackplane};
