//! PostgreSQL store driver over `tokio-postgres`.

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::warn;

use crate::domain::ports::{StoreDriver, StoreError, StoreLink};

/// Opens one `tokio-postgres` client per connection.
///
/// The connection future runs on its own task; its completion, clean or
/// not, is the disconnect notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDriver;

#[async_trait]
impl StoreDriver for PgDriver {
    type Handle = Client;

    async fn connect(&self, url: &str) -> Result<StoreLink<Client>, StoreError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|err| StoreError::connect(err.to_string()))?;
        let driving = tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(error = %err, "database connection terminated");
            }
        });
        Ok(StoreLink::new(client, async move {
            let _ = driving.await;
        }))
    }
}
