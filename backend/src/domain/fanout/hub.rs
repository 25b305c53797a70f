//! Registry of the real-time clients attached to this process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use super::{ClientId, Delivery, RoomName};

/// Deliveries queued per client before it is considered too slow to keep.
pub const OUTBOX_CAPACITY: usize = 256;

struct LocalClient {
    outbox: mpsc::Sender<Delivery>,
    rooms: HashSet<RoomName>,
}

/// Local clients and their room memberships.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct Hub {
    clients: Arc<Mutex<HashMap<ClientId, LocalClient>>>,
}

impl Hub {
    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, LocalClient>> {
        // Entries stay consistent across a panicking holder; keep serving.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a client and return the receiving end of its outbox.
    pub fn register(&self, id: ClientId) -> mpsc::Receiver<Delivery> {
        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
        self.lock().insert(
            id,
            LocalClient {
                outbox,
                rooms: HashSet::new(),
            },
        );
        inbox
    }

    /// Detach a client. Returns `false` when it was not registered.
    pub fn unregister(&self, id: &ClientId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Add `id` to `room`. Returns `false` for unknown clients.
    pub fn join(&self, id: &ClientId, room: RoomName) -> bool {
        self.lock()
            .get_mut(id)
            .map(|client| client.rooms.insert(room))
            .is_some()
    }

    /// Remove `id` from `room`. Returns `false` for unknown clients.
    pub fn leave(&self, id: &ClientId, room: &RoomName) -> bool {
        self.lock()
            .get_mut(id)
            .map(|client| client.rooms.remove(room))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Hand `envelope` to every client except its sender, restricted to room
    /// members when the envelope names a room.
    ///
    /// Clients whose outbox has closed are dropped from the registry, and so
    /// are clients whose outbox is full. Dropping the entry closes the
    /// client's inbox, which ends its connection.
    ///
    /// Returns the number of clients the envelope was queued for.
    pub fn deliver(&self, envelope: &Delivery) -> usize {
        let mut clients = self.lock();
        let mut evicted = Vec::new();
        let mut delivered = 0;
        for (id, client) in clients.iter() {
            if *id == envelope.sender {
                continue;
            }
            if let Some(room) = &envelope.room {
                if !client.rooms.contains(room) {
                    continue;
                }
            }
            match client.outbox.try_send(Arc::clone(envelope)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        client_id = %id,
                        capacity = OUTBOX_CAPACITY,
                        "client outbox full; disconnecting",
                    );
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*id),
            }
        }
        for id in evicted {
            clients.remove(&id);
        }
        delivered
    }
}
