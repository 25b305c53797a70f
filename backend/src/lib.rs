//! Bootstrap layer of a social-network backend: configuration, durable
//! store supervision, the HTTP edge, and cross-process real-time fan-out.

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod server;

pub use bootstrap::{Bootstrap, Shutdown, StartupError, StartupPhase, Started};
pub use middleware::Trace;
