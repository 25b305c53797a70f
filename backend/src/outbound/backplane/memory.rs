//! Process-local broker built on a Tokio broadcast channel.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::Envelope;
use crate::domain::ports::{Backplane, BackplaneError, BackplanePublisher, EnvelopeStream};

/// Default number of envelopes buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broker shared by every gateway holding a clone.
///
/// Like a real pub/sub channel, every subscriber (the publishing gateway
/// included) observes every envelope published after it subscribed.
#[derive(Clone)]
pub struct InMemoryBackplane {
    broker: broadcast::Sender<Envelope>,
}

impl InMemoryBackplane {
    pub fn new(capacity: usize) -> Self {
        let (broker, _) = broadcast::channel(capacity.max(1));
        Self { broker }
    }
}

impl Default for InMemoryBackplane {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

struct InMemoryPublisher {
    broker: broadcast::Sender<Envelope>,
}

#[async_trait]
impl BackplanePublisher for InMemoryPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), BackplaneError> {
        // Publishing with no subscribers is not an error, mirroring PUBLISH
        // returning zero receivers.
        let _ = self.broker.send(envelope.clone());
        Ok(())
    }
}

#[async_trait]
impl Backplane for InMemoryBackplane {
    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackplaneError> {
        Ok(Arc::new(InMemoryPublisher {
            broker: self.broker.clone(),
        }))
    }

    async fn open_subscriber(&self) -> Result<EnvelopeStream, BackplaneError> {
        let receiver = self.broker.subscribe();
        let envelopes = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => return Some((envelope, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "in-memory broker subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(envelopes.boxed())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::domain::{ClientId, EventName, NodeId};

    fn envelope(name: &str) -> Envelope {
        Envelope {
            origin: NodeId::generate(),
            sender: ClientId::generate(),
            event: EventName::new(name).expect("valid event"),
            room: None,
            data: Value::Null,
        }
    }

    #[tokio::test]
    async fn every_subscriber_observes_published_envelopes() {
        let backplane = InMemoryBackplane::default();
        let mut first = backplane.open_subscriber().await.expect("subscribe");
        let mut second = backplane.open_subscriber().await.expect("subscribe");
        let publisher = backplane.open_publisher().await.expect("publisher");

        let sent = envelope("post:created");
        publisher.publish(&sent).await.expect("publish");

        assert_eq!(first.next().await, Some(sent.clone()));
        assert_eq!(second.next().await, Some(sent));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let backplane = InMemoryBackplane::new(4);
        let publisher = backplane.open_publisher().await.expect("publisher");
        assert!(publisher.publish(&envelope("lonely")).await.is_ok());
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_retained_envelopes() {
        let backplane = InMemoryBackplane::new(2);
        let mut subscriber = backplane.open_subscriber().await.expect("subscribe");
        let publisher = backplane.open_publisher().await.expect("publisher");
        for name in ["one", "two", "three"] {
            publisher.publish(&envelope(name)).await.expect("publish");
        }

        let next = subscriber.next().await.expect("retained envelope");
        assert_eq!(next.event.as_str(), "two");
    }
}
