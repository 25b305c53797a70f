//! Wire-level frames for the real-time transport.
//!
//! Every frame is a JSON object tagged by `type`. Names arrive as plain
//! strings so that an invalid event or room name can be answered with an
//! `error` frame instead of dropping the connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ClientId, Envelope, EventName, NodeId, RoomName};

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Broadcast `data` under `event`, optionally only to `room`.
    Emit {
        event: String,
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        data: Value,
    },
    Join {
        room: String,
    },
    Leave {
        room: String,
    },
}

/// Error codes carried by [`ServerFrame::Error`].
pub const INVALID_EVENT: &str = "invalid_event";
pub const INVALID_ROOM: &str = "invalid_room";

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// First frame on every connection.
    Connected { id: ClientId, node: NodeId },
    /// An event emitted by another client, local or remote.
    Event {
        event: EventName,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<RoomName>,
        data: Value,
        from: ClientId,
    },
    Joined { room: RoomName },
    Left { room: RoomName },
    Error { code: &'static str, message: String },
}

impl From<&Envelope> for ServerFrame {
    fn from(envelope: &Envelope) -> Self {
        Self::Event {
            event: envelope.event.clone(),
            room: envelope.room.clone(),
            data: envelope.data.clone(),
            from: envelope.sender,
        }
    }
}
