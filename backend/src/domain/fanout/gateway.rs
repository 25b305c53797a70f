//! Per-process fan-out gateway bridging the local hub and the broker.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{ClientId, Delivery, Envelope, EventName, Hub, NodeId, RoomName};
use crate::domain::ReconnectBackoff;
use crate::domain::ports::{Backplane, BackplaneError, BackplanePublisher, EnvelopeStream};

/// Shortest pause between failed resubscribe attempts, applied when the
/// backoff policy itself asks for none.
const RELINK_FLOOR: Duration = Duration::from_millis(50);

/// Owns both broker links for this process.
///
/// A gateway only exists once the publisher and subscriber links are both
/// established, so any client attached through it is covered by
/// cross-process delivery. When the subscriber link later drops, the relay
/// reopens it for as long as the gateway lives and reports the gap through
/// [`link_status`](Self::link_status). Dropping the gateway stops the relay
/// task.
pub struct Gateway {
    node: NodeId,
    hub: Hub,
    publisher: Arc<dyn BackplanePublisher>,
    linked: watch::Receiver<bool>,
    relay: AbortHandle,
}

impl Gateway {
    /// Open both broker links and start relaying remote envelopes.
    ///
    /// The links are opened concurrently; the call resolves only after both
    /// succeed and fails as soon as either one fails. `relink` paces the
    /// attempts to reopen the subscriber link after it drops.
    ///
    /// # Errors
    /// Returns the first link failure; nothing is retried at this stage.
    pub async fn establish(
        backplane: Arc<dyn Backplane>,
        relink: ReconnectBackoff,
    ) -> Result<Self, BackplaneError> {
        let (publisher, inbound) =
            tokio::try_join!(backplane.open_publisher(), backplane.open_subscriber())?;
        let node = NodeId::generate();
        let hub = Hub::default();
        let (status, linked) = watch::channel(true);
        let relay = Relay {
            node,
            hub: hub.clone(),
            backplane,
            relink,
            status,
        };
        let relay = tokio::spawn(relay.run(inbound)).abort_handle();
        info!(node_id = %node, "fan-out gateway established");
        Ok(Self {
            node,
            hub,
            publisher,
            linked,
            relay,
        })
    }

    /// Identity stamped on every envelope this process publishes.
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Whether the subscriber link is currently up.
    pub fn is_linked(&self) -> bool {
        *self.linked.borrow()
    }

    /// Follow the subscriber link: `false` while it is being reopened. The
    /// channel closes once the gateway is dropped.
    pub fn link_status(&self) -> watch::Receiver<bool> {
        self.linked.clone()
    }

    /// Attach a new client; events for it arrive on the returned receiver.
    ///
    /// The receiver closes if the client falls too far behind; see
    /// [`Hub::deliver`].
    pub fn connect(&self) -> (ClientId, mpsc::Receiver<Delivery>) {
        let id = ClientId::generate();
        let inbox = self.hub.register(id);
        debug!(node_id = %self.node, client_id = %id, "client attached");
        (id, inbox)
    }

    /// Detach a client; unknown ids are ignored.
    pub fn disconnect(&self, id: &ClientId) {
        if self.hub.unregister(id) {
            debug!(node_id = %self.node, client_id = %id, "client detached");
        }
    }

    /// Add a client to a room. Returns `false` for unknown clients.
    pub fn join(&self, id: &ClientId, room: RoomName) -> bool {
        self.hub.join(id, room)
    }

    /// Remove a client from a room. Returns `false` for unknown clients.
    pub fn leave(&self, id: &ClientId, room: &RoomName) -> bool {
        self.hub.leave(id, room)
    }

    /// Deliver an event from `sender` to local clients and publish it for
    /// every other process.
    ///
    /// A failed publish is logged; local recipients still receive the event.
    /// Returns the number of local clients it was queued for.
    pub async fn emit(
        &self,
        sender: ClientId,
        event: EventName,
        room: Option<RoomName>,
        data: Value,
    ) -> usize {
        let envelope = Arc::new(Envelope {
            origin: self.node,
            sender,
            event,
            room,
            data,
        });
        let delivered = self.hub.deliver(&envelope);
        if let Err(error) = self.publisher.publish(&envelope).await {
            warn!(
                node_id = %self.node,
                client_id = %sender,
                error = %error,
                "failed to publish event to broker",
            );
        }
        delivered
    }

    /// Number of clients attached to this process.
    pub fn connected_clients(&self) -> usize {
        self.hub.len()
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

/// Background task forwarding broker envelopes to local clients.
struct Relay {
    node: NodeId,
    hub: Hub,
    backplane: Arc<dyn Backplane>,
    relink: ReconnectBackoff,
    status: watch::Sender<bool>,
}

impl Relay {
    async fn run(self, mut inbound: EnvelopeStream) {
        loop {
            self.forward(&mut inbound).await;
            self.status.send_replace(false);
            warn!(node_id = %self.node, "broker subscription ended; resubscribing");
            inbound = self.resubscribe().await;
            self.status.send_replace(true);
        }
    }

    async fn forward(&self, inbound: &mut EnvelopeStream) {
        while let Some(envelope) = inbound.next().await {
            if envelope.origin == self.node {
                continue;
            }
            let origin = envelope.origin;
            let delivered = self.hub.deliver(&Arc::new(envelope));
            debug!(node_id = %self.node, origin = %origin, delivered, "relayed remote event");
        }
    }

    /// Reopen the subscriber link, retrying until it succeeds.
    async fn resubscribe(&self) -> EnvelopeStream {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let mut delay = self.relink.delay_for(attempt);
            if attempt > 1 {
                delay = delay.max(RELINK_FLOOR);
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.backplane.open_subscriber().await {
                Ok(inbound) => {
                    info!(node_id = %self.node, attempt, "broker subscription restored");
                    return inbound;
                }
                Err(error) => {
                    warn!(
                        node_id = %self.node,
                        attempt,
                        error = %error,
                        "broker resubscribe failed",
                    );
                }
            }
        }
    }
}
