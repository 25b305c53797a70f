//! Real-time fan-out across server processes.
//!
//! Each process runs one [`Gateway`]. Clients attached to a process are held
//! in its [`Hub`]; events they emit are delivered locally at once and
//! published to the shared broker, from which every other process relays
//! them to its own clients. An [`Envelope`] carries the origin [`NodeId`] so
//! a process never re-delivers its own events when the broker echoes them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ports::BackplaneError;

mod gateway;
mod hub;

pub use gateway::Gateway;
pub use hub::{Hub, OUTBOX_CAPACITY};

/// Maximum length, in characters, of event and room names.
pub const NAME_MAX: usize = 128;

/// Identity of one server process on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Fresh random identity for this process.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one connected real-time client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reasons an event or room name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// The name is the empty string.
    #[error("name must not be empty")]
    Empty,
    /// The name exceeds [`NAME_MAX`] characters.
    #[error("name must be at most {max} characters")]
    TooLong { max: usize },
    /// The name contains a control character such as a newline.
    #[error("name must not contain control characters")]
    ControlCharacter,
}

fn validate_name(raw: String) -> Result<String, NameError> {
    if raw.is_empty() {
        return Err(NameError::Empty);
    }
    if raw.chars().count() > NAME_MAX {
        return Err(NameError::TooLong { max: NAME_MAX });
    }
    if raw.chars().any(char::is_control) {
        return Err(NameError::ControlCharacter);
    }
    Ok(raw)
}

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
                validate_name(value.into()).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = NameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

validated_name! {
    /// Application-defined event name, e.g. `"post:created"`.
    EventName
}

validated_name! {
    /// Named group of clients that receive room-scoped events.
    RoomName
}

/// One event as it travels between processes.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use social_backend::domain::{ClientId, Envelope, EventName, NodeId};
///
/// let envelope = Envelope {
///     origin: NodeId::generate(),
///     sender: ClientId::generate(),
///     event: EventName::new("post:created").expect("valid name"),
///     room: None,
///     data: json!({"id": 7}),
/// };
/// let wire = envelope.to_json().expect("encodes");
/// assert_eq!(Envelope::from_json(&wire).expect("decodes"), envelope);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub origin: NodeId,
    pub sender: ClientId,
    pub event: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomName>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, BackplaneError> {
        serde_json::to_string(self).map_err(|error| BackplaneError::codec(error.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, BackplaneError> {
        serde_json::from_str(raw).map_err(|error| BackplaneError::codec(error.to_string()))
    }
}

/// Shared envelope handed to every local recipient.
pub type Delivery = std::sync::Arc<Envelope>;
