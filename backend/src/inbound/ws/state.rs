//! Shared WebSocket adapter state.

use std::sync::Arc;

use crate::domain::Gateway;
use crate::inbound::http::cors::CorsPolicy;

/// Dependency bundle for the `/ws` entry point.
///
/// Holding a [`Gateway`] means both broker links are already established;
/// the entry point cannot be mounted before that.
#[derive(Clone)]
pub struct WsState {
    pub gateway: Arc<Gateway>,
    pub policy: CorsPolicy,
}

impl WsState {
    pub fn new(gateway: Arc<Gateway>, policy: CorsPolicy) -> Self {
        Self { gateway, policy }
    }
}
