//! Transport-agnostic core.
//!
//! Holds cross-process fan-out, the reconnect policy, application errors,
//! and the ports adapters plug into. Nothing here knows about HTTP,
//! WebSocket framing, Redis, or Postgres.
//!
//! Public surface:
//! - [`AppError`] / [`ErrorKind`]: structured application errors.
//! - [`ReconnectBackoff`]: delay policy for store reconnects.
//! - [`Gateway`] / [`Hub`] / [`Envelope`]: real-time fan-out.
//! - [`ports`]: `Backplane` and `StoreDriver` seams.

pub mod error;
pub mod fanout;
pub mod ports;
pub mod reconnect;

pub use self::error::{AppError, ErrorBody, ErrorKind};
pub use self::fanout::{
    ClientId, Delivery, Envelope, EventName, Gateway, Hub, NameError, NodeId, RoomName,
};
pub use self::reconnect::ReconnectBackoff;
