//! HTTP inbound adapter: the middleware chain and the endpoints the edge
//! itself owns.
//!
//! Application routes are mounted by the caller; see
//! [`crate::server::build_app`] for the order the pieces are assembled in.

pub mod body;
pub mod cors;
pub mod error;
pub mod error_boundary;
pub mod health;
pub mod param_pollution;
pub mod security_headers;
pub mod session;

pub use error::ApiResult;
