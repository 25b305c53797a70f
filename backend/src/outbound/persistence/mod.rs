//! Durable-store connection management.
//!
//! [`StoreConnector`] owns the process's single logical store connection:
//! the first connection attempt is fatal on failure, after which a
//! supervisor task re-establishes the connection every time the driver
//! reports a disconnect. Request handlers read the live connection through
//! a [`StoreHandle`].
//!
//! # Example
//!
//! ```ignore
//! use social_backend::domain::ReconnectBackoff;
//! use social_backend::outbound::persistence::{PgDriver, StoreConnector};
//!
//! let handle = StoreConnector::new(PgDriver, "postgres://localhost/social", ReconnectBackoff::Immediate)
//!     .connect()
//!     .await?;
//! let client = handle.current();
//! ```

mod connector;
mod postgres;

pub use connector::{StoreConnector, StoreHandle};
pub use postgres::PgDriver;
