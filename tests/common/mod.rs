#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for chat sync client integration tests.
//!
//! Provides a scripted [`MockServer`] that doubles as the client's
//! [`Connector`], an [`EventLog`] that records dispatched events, and helpers
//! for building server frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_sync_client::protocol::{
    ChatMessagePayload, DeliveryStatusPayload, ReadConfirmationPayload, RoomErrorPayload, RoomRef,
    TypingPayload, UserStatusPayload,
};
use chat_sync_client::{
    handler, ChatClient, ChatConfig, ChatError, ChatEvent, ClientMessage, Connector, Identity,
    MessageType, RoomId, ServerMessage, Target, Transport, TransportKind, UserId, UserStatus,
};
use tokio::sync::mpsc;

/// One inbound item as `Transport::recv` yields it. `None` means the server
/// closed the connection.
pub type Frame = Option<Result<String, ChatError>>;

/// Local user of every test client.
pub const ALICE: UserId = 1;
/// A peer.
pub const BOB: UserId = 2;

/// Every event name a [`ChatClient`] can emit.
pub const ALL_EVENTS: &[&str] = &[
    "connected",
    "disconnected",
    "connection_error",
    "reconnected",
    "reconnect_failed",
    "connection_established",
    "room_joined",
    "room_join_error",
    "room_left",
    "room_leave_error",
    "participants_list",
    "room_status_changed",
    "room_updated",
    "participant_joined",
    "participant_left",
    "room_welcome",
    "room_reminder",
    "subscribed_to_room",
    "unsubscribed_from_room",
    "emergency_alert",
    "emergency_alert_sent",
    "emergency_alert_error",
    "message_received",
    "message_delivered",
    "message_read",
    "broadcast_success",
    "broadcast_error",
    "message_error",
    "user_typing",
    "user_stopped_typing",
    "user_status_updated",
    "heartbeat_ack",
    "notification_shown",
    "notification_dismissed",
];

// ── MockServer ──────────────────────────────────────────────────────

enum Attempt {
    Refuse,
    Accept(mpsc::UnboundedReceiver<Frame>),
}

/// Test side of one accepted connection.
pub struct ServerLink {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ServerLink {
    /// Deliver one server frame to the client.
    pub fn push(&self, message: &ServerMessage) {
        let json = serde_json::to_string(message).expect("serialize server frame");
        self.push_raw(json);
    }

    /// Deliver raw text, valid JSON or not.
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.tx.send(Some(Ok(text.into())));
    }

    /// Drop the connection from the server side.
    pub fn close(&self) {
        let _ = self.tx.send(None);
    }

    /// Fail the connection with a receive error.
    pub fn fail(&self, reason: &str) {
        let _ = self
            .tx
            .send(Some(Err(ChatError::TransportReceive(reason.into()))));
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<StdMutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        match self.inbound.recv().await {
            Some(frame) => frame,
            // Link dropped by the test: stay open until closed from our side.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted server. Each connect attempt consumes the next planned outcome;
/// attempts beyond the plan are refused.
#[derive(Clone, Default)]
pub struct MockServer {
    plan: Arc<StdMutex<VecDeque<Attempt>>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
    endpoints: Arc<StdMutex<Vec<String>>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan an accepted connection and return the handle that feeds it.
    pub fn accept(&self) -> ServerLink {
        let (tx, rx) = mpsc::unbounded_channel();
        self.plan.lock().unwrap().push_back(Attempt::Accept(rx));
        ServerLink { tx }
    }

    /// Plan a refused connection.
    pub fn refuse(&self) {
        self.plan.lock().unwrap().push_back(Attempt::Refuse);
    }

    /// Number of connect attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of times the client closed a transport.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }

    /// Every frame the client wrote, decoded.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("client frame is valid JSON"))
            .collect()
    }

    /// Every frame the client wrote, as raw JSON text.
    pub fn sent_raw(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Event names of every frame the client wrote.
    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().iter().map(ClientMessage::event_name).collect()
    }

    pub fn count_sent(&self, name: &str) -> usize {
        self.sent_names().iter().filter(|n| **n == name).count()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn connect(
        &self,
        endpoint: &str,
        _identity: &Identity,
        _transports: &[TransportKind],
    ) -> Result<Box<dyn Transport>, ChatError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.to_string());
        let next = self.plan.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Accept(inbound)) => Ok(Box::new(MockTransport {
                inbound,
                sent: Arc::clone(&self.sent),
                closes: Arc::clone(&self.closes),
            })),
            Some(Attempt::Refuse) | None => {
                Err(ChatError::TransportReceive("connection refused".into()))
            }
        }
    }
}

// ── EventLog ────────────────────────────────────────────────────────

/// Records every event a client dispatches, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<StdMutex<Vec<ChatEvent>>>,
}

impl EventLog {
    /// Register a recorder for every event name on `client`.
    pub fn attach(client: &ChatClient) -> Self {
        let log = Self::default();
        for name in ALL_EVENTS {
            let events = Arc::clone(&log.events);
            client.on(
                *name,
                handler(move |event| events.lock().unwrap().push(event.clone())),
            );
        }
        log
    }

    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(ChatEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

// ── Client helpers ──────────────────────────────────────────────────

/// Let the session loop run until it is idle.
///
/// Under a paused clock this advances virtual time by one millisecond, which
/// only happens once every task is waiting.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Advance virtual time by `duration`, letting every timer on the way fire.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

/// A client for user [`ALICE`] with an event log attached. Not yet connected.
pub fn client(server: &MockServer, config: ChatConfig) -> (ChatClient, EventLog) {
    let client = ChatClient::new(
        server.clone(),
        "ws://chat.test",
        Identity::new(ALICE, "alice"),
        config,
    );
    let log = EventLog::attach(&client);
    (client, log)
}

/// A connected client with presence announcements off, so the sent log
/// starts empty.
pub async fn connected(config: ChatConfig) -> (ChatClient, MockServer, ServerLink, EventLog) {
    let server = MockServer::new();
    let link = server.accept();
    let (client, log) = client(&server, config.with_announce_presence(false));
    client.connect();
    settle().await;
    assert!(client.is_connected(), "mock connection should be up");
    log.clear();
    (client, server, link, log)
}

// ── Frame builders ──────────────────────────────────────────────────

pub fn joined_room(room_id: RoomId) -> ServerMessage {
    ServerMessage::JoinedRoom(RoomRef { room_id })
}

pub fn left_room(room_id: RoomId) -> ServerMessage {
    ServerMessage::LeftRoom(RoomRef { room_id })
}

pub fn join_room_error(room_id: RoomId, reason: &str) -> ServerMessage {
    ServerMessage::JoinRoomError(RoomErrorPayload {
        room_id,
        error: Some(reason.into()),
    })
}

pub fn leave_room_error(room_id: RoomId, reason: &str) -> ServerMessage {
    ServerMessage::LeaveRoomError(RoomErrorPayload {
        room_id,
        error: Some(reason.into()),
    })
}

/// A chat payload from `sender` to `target`.
pub fn chat(sender_id: UserId, message_id: u64, target: Target, content: &str) -> ChatMessagePayload {
    ChatMessagePayload {
        message_id,
        sender_id,
        sender_name: if sender_id == ALICE { "alice" } else { "bob" }.into(),
        content: content.into(),
        message_type: MessageType::Text,
        timestamp: 1_700_000_000_000,
        room_id: target.room(),
        receiver_id: target.peer(),
    }
}

pub fn room_message(sender_id: UserId, message_id: u64, room_id: RoomId) -> ServerMessage {
    ServerMessage::RoomMessageReceived(chat(sender_id, message_id, Target::Room(room_id), "hi room"))
}

pub fn private_message(sender_id: UserId, message_id: u64) -> ServerMessage {
    ServerMessage::PrivateMessageReceived(chat(sender_id, message_id, Target::Peer(ALICE), "hi"))
}

pub fn delivered(message_id: u64) -> ServerMessage {
    ServerMessage::MessageDeliveryStatus(DeliveryStatusPayload {
        message_id,
        delivered: true,
    })
}

pub fn read(message_id: u64, read_at: u64) -> ServerMessage {
    ServerMessage::MessageReadConfirmation(ReadConfirmationPayload {
        message_id,
        read_at: Some(read_at),
    })
}

pub fn status(user_id: UserId, name: &str, status: UserStatus) -> ServerMessage {
    ServerMessage::UserStatusUpdated(UserStatusPayload {
        user_id,
        user_name: name.into(),
        status,
    })
}

pub fn typing_in_room(user_id: UserId, room_id: RoomId) -> ServerMessage {
    ServerMessage::UserTypingInRoom(TypingPayload::new(user_id, "bob", Target::Room(room_id)))
}

pub fn stopped_typing_in_room(user_id: UserId, room_id: RoomId) -> ServerMessage {
    ServerMessage::UserStoppedTypingInRoom(TypingPayload::new(
        user_id,
        "bob",
        Target::Room(room_id),
    ))
}

pub fn typing_private(user_id: UserId) -> ServerMessage {
    ServerMessage::UserTypingPrivate(TypingPayload::new(user_id, "bob", Target::Peer(ALICE)))
}
