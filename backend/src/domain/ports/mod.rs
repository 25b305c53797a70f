//! Ports: the seams outbound adapters implement.
//!
//! - [`Backplane`] / [`BackplanePublisher`]: the shared broker that relays
//!   fan-out envelopes between server processes.
//! - [`StoreDriver`]: opens durable-store connections and reports when
//!   they drop.

mod backplane;
mod macros;
mod store_driver;

pub(crate) use macros::define_port_error;

#[cfg(test)]
pub use backplane::MockBackplanePublisher;
pub use backplane::{Backplane, BackplaneError, BackplanePublisher, EnvelopeStream};
pub use store_driver::{StoreDriver, StoreError, StoreLink};
