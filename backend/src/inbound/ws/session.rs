//! Per-connection WebSocket handler.
//!
//! Bridges one client to the fan-out [`Gateway`]: inbound frames become
//! gateway calls, and envelopes queued for the client become outbound
//! frames. The public contract pings every 5s and considers a connection
//! idle after 10s without client traffic. Tests shorten these intervals.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_ws::{CloseCode, CloseReason, Closed, Message, MessageStream, ProtocolError, Session};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

use crate::domain::{ClientId, Delivery, EventName, Gateway, RoomName};
use crate::inbound::ws::messages::{ClientFrame, INVALID_EVENT, INVALID_ROOM, ServerFrame};

/// Time between heartbeats to the client (5s in production, shorter in tests).
#[cfg(not(test))]
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
#[cfg(test)]
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Max idle time before disconnecting the client (10s in production, shorter in tests).
#[cfg(not(test))]
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
#[cfg(test)]
const CLIENT_TIMEOUT: Duration = Duration::from_millis(500);

pub(super) async fn handle_ws_session(
    gateway: Arc<Gateway>,
    client: ClientId,
    inbox: mpsc::Receiver<Delivery>,
    session: Session,
    stream: MessageStream,
) {
    let ws_session = WsSession { gateway, client };
    ws_session.run(session, stream, inbox).await;
    ws_session.gateway.disconnect(&client);
}

enum SessionError {
    ClientClosed(Option<CloseReason>),
    StreamClosed,
    Evicted,
    HeartbeatTimeout,
    Protocol(ProtocolError),
    InvalidPayload,
    Network(Closed),
}

enum CloseAction {
    None,
    Close(Option<CloseReason>),
}

struct WsSession {
    gateway: Arc<Gateway>,
    client: ClientId,
}

impl WsSession {
    async fn run(
        &self,
        mut session: Session,
        mut stream: MessageStream,
        mut inbox: mpsc::Receiver<Delivery>,
    ) {
        let greeting = ServerFrame::Connected {
            id: self.client,
            node: self.gateway.node_id(),
        };
        if let Err(error) = self.send_frame(&mut session, &greeting).await {
            warn!(client_id = %self.client, error = %error, "WebSocket greeting failed");
            return;
        }

        let mut last_heartbeat = Instant::now();
        let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);

        loop {
            let result = tokio::select! {
                _ = heartbeat.tick() => {
                    self.handle_heartbeat_tick(&mut session, &last_heartbeat).await
                }
                message = stream.recv() => {
                    self.handle_stream_message(&mut session, &mut last_heartbeat, message)
                        .await
                }
                delivery = inbox.recv() => {
                    self.handle_delivery(&mut session, delivery).await
                }
            };

            if let Err(error) = result {
                self.log_shutdown_reason(&error);
                let close_action = self.close_action_for(&error);
                self.close_session_if_needed(session, close_action).await;
                return;
            }
        }
    }

    async fn handle_heartbeat_tick(
        &self,
        session: &mut Session,
        last_heartbeat: &Instant,
    ) -> Result<(), SessionError> {
        if Instant::now().duration_since(*last_heartbeat) > CLIENT_TIMEOUT {
            return Err(SessionError::HeartbeatTimeout);
        }

        session.ping(b"").await.map_err(SessionError::Network)
    }

    async fn handle_delivery(
        &self,
        session: &mut Session,
        delivery: Option<Delivery>,
    ) -> Result<(), SessionError> {
        let Some(envelope) = delivery else {
            return Err(SessionError::Evicted);
        };
        self.send_frame(session, &ServerFrame::from(envelope.as_ref()))
            .await
            .map_err(SessionError::Network)
    }

    async fn handle_stream_message(
        &self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Option<Result<Message, ProtocolError>>,
    ) -> Result<(), SessionError> {
        let Some(message) = message else {
            return Err(SessionError::StreamClosed);
        };

        match message {
            Ok(message) => self.handle_message(session, last_heartbeat, message).await,
            Err(error) => Err(SessionError::Protocol(error)),
        }
    }

    async fn handle_message(
        &self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Message,
    ) -> Result<(), SessionError> {
        match message {
            Message::Ping(payload) => {
                *last_heartbeat = Instant::now();
                session
                    .pong(&payload)
                    .await
                    .map_err(SessionError::Network)?;
                Ok(())
            }
            Message::Text(text) => {
                *last_heartbeat = Instant::now();
                self.handle_text_message(session, text.as_ref()).await
            }
            Message::Pong(_) | Message::Binary(_) | Message::Continuation(_) | Message::Nop => {
                *last_heartbeat = Instant::now();
                Ok(())
            }
            Message::Close(reason) => Err(SessionError::ClientClosed(reason)),
        }
    }

    async fn handle_text_message(
        &self,
        session: &mut Session,
        text: &str,
    ) -> Result<(), SessionError> {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(client_id = %self.client, error = %error, "Rejected malformed WebSocket payload");
                return Err(SessionError::InvalidPayload);
            }
        };

        let reply = match frame {
            ClientFrame::Emit { event, room, data } => self.emit(event, room, data).await,
            ClientFrame::Join { room } => match RoomName::new(room) {
                Ok(room) => {
                    self.gateway.join(&self.client, room.clone());
                    Some(ServerFrame::Joined { room })
                }
                Err(error) => Some(invalid(INVALID_ROOM, &error)),
            },
            ClientFrame::Leave { room } => match RoomName::new(room) {
                Ok(room) => {
                    self.gateway.leave(&self.client, &room);
                    Some(ServerFrame::Left { room })
                }
                Err(error) => Some(invalid(INVALID_ROOM, &error)),
            },
        };

        match reply {
            Some(frame) => self
                .send_frame(session, &frame)
                .await
                .map_err(SessionError::Network),
            None => Ok(()),
        }
    }

    /// Returns an error frame when a name is invalid; nothing otherwise.
    async fn emit(
        &self,
        event: String,
        room: Option<String>,
        data: serde_json::Value,
    ) -> Option<ServerFrame> {
        let event = match EventName::new(event) {
            Ok(event) => event,
            Err(error) => return Some(invalid(INVALID_EVENT, &error)),
        };
        let room = match room.map(RoomName::new).transpose() {
            Ok(room) => room,
            Err(error) => return Some(invalid(INVALID_ROOM, &error)),
        };
        let delivered = self.gateway.emit(self.client, event, room, data).await;
        debug!(client_id = %self.client, delivered, "client event emitted");
        None
    }

    async fn send_frame(&self, session: &mut Session, frame: &ServerFrame) -> Result<(), Closed> {
        match serde_json::to_string(frame) {
            Ok(body) => session.text(body).await,
            Err(error) => {
                warn!(error = %error, "Failed to serialize WebSocket frame");
                Ok(())
            }
        }
    }

    fn log_shutdown_reason(&self, error: &SessionError) {
        match error {
            SessionError::HeartbeatTimeout => {
                warn!(client_id = %self.client, "WebSocket heartbeat timeout; closing connection");
            }
            SessionError::Protocol(error) => {
                warn!(client_id = %self.client, error = %error, "WebSocket protocol error");
            }
            SessionError::Network(error) => {
                warn!(client_id = %self.client, error = %error, "WebSocket send failed; closing connection");
            }
            SessionError::Evicted => {
                warn!(client_id = %self.client, "WebSocket client fell behind; closing connection");
            }
            SessionError::InvalidPayload
            | SessionError::ClientClosed(_)
            | SessionError::StreamClosed => {}
        }
    }

    fn close_action_for(&self, error: &SessionError) -> CloseAction {
        match error {
            SessionError::HeartbeatTimeout => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Normal,
                description: Some("heartbeat timeout".to_owned()),
            })),
            SessionError::Protocol(_) => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Protocol,
                description: Some("protocol error".to_owned()),
            })),
            SessionError::InvalidPayload => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Policy,
                description: Some("invalid payload".to_owned()),
            })),
            SessionError::Evicted => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Again,
                description: Some("client too slow".to_owned()),
            })),
            SessionError::ClientClosed(reason) => CloseAction::Close(reason.clone()),
            SessionError::StreamClosed | SessionError::Network(_) => CloseAction::None,
        }
    }

    async fn close_session_if_needed(&self, session: Session, close_action: CloseAction) {
        if let CloseAction::Close(reason) = close_action {
            if let Err(error) = session.close(reason).await {
                warn!(error = %error, "Failed to close WebSocket session");
            }
        }
    }
}

fn invalid(code: &'static str, error: &impl std::fmt::Display) -> ServerFrame {
    ServerFrame::Error {
        code,
        message: error.to_string(),
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
