//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL store driver and the supervising connector
//! - **backplane**: Redis pub/sub and in-memory fan-out brokers
//!
//! Adapters are thin translators between domain types and infrastructure
//! representations. They contain no business logic.

pub mod backplane;
pub mod persistence;
