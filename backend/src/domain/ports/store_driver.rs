//! Port for opening durable-store connections.
//!
//! A driver returns the usable handle together with a future that resolves
//! once the underlying connection is gone. The connector above it turns that
//! signal into reconnect attempts.

use std::future::Future;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use super::define_port_error;

define_port_error! {
    /// Errors raised by store drivers.
    pub enum StoreError {
        /// The connection could not be established.
        Connect => "store connection failed",
    }
}

/// A live connection: the handle plus its disconnect notification.
pub struct StoreLink<H> {
    handle: H,
    disconnected: BoxFuture<'static, ()>,
}

impl<H> StoreLink<H> {
    /// Pair a handle with the future that completes on disconnect.
    pub fn new<F>(handle: H, disconnected: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle,
            disconnected: disconnected.boxed(),
        }
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Split into the handle and the disconnect notification.
    pub fn into_parts(self) -> (H, BoxFuture<'static, ()>) {
        (self.handle, self.disconnected)
    }
}

/// Opens connections to the durable store.
#[async_trait]
pub trait StoreDriver: Send + Sync + 'static {
    /// Connection handle shared with request handlers.
    type Handle: Send + Sync + 'static;

    /// Open one connection to `url`.
    async fn connect(&self, url: &str) -> Result<StoreLink<Self::Handle>, StoreError>;
}
