//! Redis pub/sub broker adapter.
//!
//! The publisher side checks out connections from a `bb8` pool and issues
//! `PUBLISH`; the subscriber side holds one dedicated pub/sub connection, as
//! a subscribed Redis connection cannot serve other commands.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::Pool;
use bb8_redis::redis;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::domain::Envelope;
use crate::domain::ports::{Backplane, BackplaneError, BackplanePublisher, EnvelopeStream};

/// Connection settings for the Redis broker.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use social_backend::outbound::backplane::BrokerConfig;
///
/// let config = BrokerConfig::new("redis://127.0.0.1:6379", "fanout:events")
///     .with_max_size(4)
///     .with_connection_timeout(Duration::from_secs(5));
/// assert_eq!(config.channel(), "fanout:events");
/// ```
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    url: String,
    channel: String,
    max_size: u32,
    connection_timeout: Duration,
}

impl BrokerConfig {
    /// Defaults: 8 pooled publisher connections, 30 second checkout timeout.
    pub fn new(url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel: channel.into(),
            max_size: 8,
            connection_timeout: Duration::from_secs(30),
        }
    }

    /// Size of the publisher connection pool.
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    /// How long a publish waits for a pooled connection.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Broker connection URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Channel every process publishes to and subscribes on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Broker reached at a Redis address; every process using the same address
/// and channel shares one fan-out domain.
#[derive(Debug, Clone)]
pub struct RedisBackplane {
    config: BrokerConfig,
}

impl RedisBackplane {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

struct RedisPublisher {
    pool: Pool<RedisConnectionManager>,
    channel: String,
}

impl RedisPublisher {
    async fn ping(&self) -> Result<(), BackplaneError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|error| BackplaneError::link(error.to_string()))?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|error| BackplaneError::link(error.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl BackplanePublisher for RedisPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), BackplaneError> {
        let payload = envelope.to_json()?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|error| BackplaneError::publish(error.to_string()))?;
        let receivers = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async::<i64>(&mut *conn)
            .await
            .map_err(|error| BackplaneError::publish(error.to_string()))?;
        debug!(channel = %self.channel, receivers, "published envelope");
        Ok(())
    }
}

#[async_trait]
impl Backplane for RedisBackplane {
    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackplaneError> {
        let manager = RedisConnectionManager::new(self.config.url())
            .map_err(|error| BackplaneError::link(error.to_string()))?;
        let pool = Pool::builder()
            .max_size(self.config.max_size)
            .connection_timeout(self.config.connection_timeout)
            .build(manager)
            .await
            .map_err(|error| BackplaneError::link(error.to_string()))?;
        let publisher = RedisPublisher {
            pool,
            channel: self.config.channel.clone(),
        };
        // Pool construction is lazy about failures; prove the link works.
        publisher.ping().await?;
        Ok(Arc::new(publisher))
    }

    async fn open_subscriber(&self) -> Result<EnvelopeStream, BackplaneError> {
        let client = redis::Client::open(self.config.url())
            .map_err(|error| BackplaneError::link(error.to_string()))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|error| BackplaneError::link(error.to_string()))?;
        pubsub
            .subscribe(&self.config.channel)
            .await
            .map_err(|error| BackplaneError::link(error.to_string()))?;

        let channel = self.config.channel.clone();
        let envelopes = pubsub.into_on_message().filter_map(move |message| {
            let decoded = message
                .get_payload::<String>()
                .map_err(|error| BackplaneError::codec(error.to_string()))
                .and_then(|payload| Envelope::from_json(&payload));
            let envelope = match decoded {
                Ok(envelope) => Some(envelope),
                Err(error) => {
                    warn!(channel = %channel, error = %error, "discarding undecodable envelope");
                    None
                }
            };
            futures_util::future::ready(envelope)
        });
        Ok(envelopes.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn broker_config_defaults() {
        let config = BrokerConfig::new("redis://broker:6379", "fanout:events");
        assert_eq!(config.url(), "redis://broker:6379");
        assert_eq!(config.max_size, 8);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_broker_url_fails_both_links() {
        let backplane = RedisBackplane::new(BrokerConfig::new("not-a-redis-url", "c"));
        assert!(matches!(
            backplane.open_publisher().await,
            Err(BackplaneError::Link { .. })
        ));
        assert!(matches!(
            backplane.open_subscriber().await,
            Err(BackplaneError::Link { .. })
        ));
    }
}
