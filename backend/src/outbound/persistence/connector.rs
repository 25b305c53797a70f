//! Connect-once, reconnect-forever supervision of the store connection.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::ReconnectBackoff;
use crate::domain::ports::{StoreDriver, StoreError};

/// Read side of the supervised connection.
///
/// Cloning is cheap. [`current`](Self::current) always returns the most
/// recently established connection.
pub struct StoreHandle<H> {
    current: watch::Receiver<Arc<H>>,
}

impl<H> Clone for StoreHandle<H> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
        }
    }
}

impl<H> StoreHandle<H> {
    pub fn current(&self) -> Arc<H> {
        Arc::clone(&self.current.borrow())
    }

    /// Wait until a reconnect replaces the connection. Returns `false` once
    /// the supervisor has stopped.
    pub async fn changed(&mut self) -> bool {
        self.current.changed().await.is_ok()
    }
}

/// Establishes and supervises the store connection.
pub struct StoreConnector<D> {
    driver: Arc<D>,
    url: String,
    backoff: ReconnectBackoff,
}

impl<D: StoreDriver> StoreConnector<D> {
    pub fn new(driver: D, url: impl Into<String>, backoff: ReconnectBackoff) -> Self {
        Self {
            driver: Arc::new(driver),
            url: url.into(),
            backoff,
        }
    }

    /// Open the first connection and start supervising it.
    ///
    /// # Errors
    ///
    /// Returns the driver's error when the first attempt fails; that attempt
    /// is never retried.
    pub async fn connect(self) -> Result<StoreHandle<D::Handle>, StoreError> {
        let link = match self.driver.connect(&self.url).await {
            Ok(link) => link,
            Err(err) => {
                error!(error = %err, "error connecting to the database");
                return Err(err);
            }
        };
        info!("successfully connected to the database");

        let (handle, disconnected) = link.into_parts();
        let (publisher, current) = watch::channel(Arc::new(handle));
        tokio::spawn(self.supervise(publisher, disconnected));
        Ok(StoreHandle { current })
    }

    async fn supervise(
        self,
        publisher: watch::Sender<Arc<D::Handle>>,
        mut disconnected: BoxFuture<'static, ()>,
    ) {
        loop {
            disconnected.await;
            if publisher.is_closed() {
                debug!("store handle released; stopping supervision");
                return;
            }
            warn!("database connection lost; reconnecting");
            disconnected = self.reconnect(&publisher).await;
        }
    }

    async fn reconnect(
        &self,
        publisher: &watch::Sender<Arc<D::Handle>>,
    ) -> BoxFuture<'static, ()> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let delay = self.backoff.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.driver.connect(&self.url).await {
                Ok(link) => {
                    let (handle, disconnected) = link.into_parts();
                    publisher.send_replace(Arc::new(handle));
                    info!(attempt, "reconnected to the database");
                    return disconnected;
                }
                Err(err) => warn!(attempt, error = %err, "database reconnect failed"),
            }
        }
    }
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;
