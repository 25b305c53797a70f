//! Request middleware shared by every route: trace correlation.

pub mod trace;

pub use trace::{TRACE_ID_HEADER, Trace, TraceId};
