//! Port for the publish/subscribe broker behind cross-process fan-out.
//!
//! A backplane hands out two independent links: a publisher for envelopes
//! originating in this process, and a subscriber stream carrying envelopes
//! published by every process on the same channel (this one included).

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::Envelope;

use super::define_port_error;

define_port_error! {
    /// Errors raised by broker adapters.
    pub enum BackplaneError {
        /// A publisher or subscriber link could not be established.
        Link => "broker link failed",
        /// An envelope could not be handed to the broker.
        Publish => "broker publish failed",
        /// An envelope could not be encoded or decoded.
        Codec => "broker envelope codec failed",
    }
}

/// Inbound envelopes from the subscriber link.
pub type EnvelopeStream = BoxStream<'static, Envelope>;

/// Outbound link to the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackplanePublisher: Send + Sync {
    /// Publish an envelope to every process subscribed to the channel.
    async fn publish(&self, envelope: &Envelope) -> Result<(), BackplaneError>;
}

/// Factory for the publisher/subscriber link pair.
#[async_trait]
pub trait Backplane: Send + Sync {
    /// Establish the outbound link.
    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackplaneError>;

    /// Establish the inbound link; the stream yields envelopes published after
    /// this call resolves.
    async fn open_subscriber(&self) -> Result<EnvelopeStream, BackplaneError>;
}
