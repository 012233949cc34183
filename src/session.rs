//! All per-connection state, mutated synchronously.
//!
//! A [`Session`] bundles the connection machine and every tracker. Each entry
//! point returns an [`Outcome`]: the events to dispatch and the frames to put
//! on the wire. Callers apply an outcome only after releasing the session lock,
//! so no callback ever runs while the session is borrowed.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::{ConnectionConfig, ConnectionMachine, Identity};
use crate::delivery::{MessageDeliveryTracker, MessageKind};
use crate::event::ChatEvent;
use crate::notifications::{
    NotificationItem, NotificationKind, NotificationQueue, DEFAULT_NOTIFICATION_TTL,
};
use crate::presence::{PresenceTracker, DEFAULT_HEARTBEAT_INTERVAL};
use crate::protocol::{
    now_millis, ChatMessagePayload, ClientMessage, RoomRef, ServerMessage, UserStatus,
    UserStatusPayload,
};
use crate::rooms::RoomSubscriptionRegistry;
use crate::typing::{TypingIndicatorTracker, DEFAULT_REMOTE_TYPING_EXPIRY, DEFAULT_TYPING_TIMEOUT};

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ChatClient`](crate::ChatClient).
///
/// # Example
///
/// ```
/// use chat_sync_client::ChatConfig;
/// use std::time::Duration;
///
/// let config = ChatConfig::new()
///     .with_heartbeat_interval(Duration::from_secs(15))
///     .with_notify_on_incoming(false);
/// assert_eq!(config.typing_timeout, Duration::from_millis(3000));
/// assert!(config.announce_presence);
/// ```
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Transport preference and reconnection policy.
    pub connection: ConnectionConfig,
    /// Interval between heartbeats while connected. Defaults to **30 s**.
    pub heartbeat_interval: Duration,
    /// Keystroke silence that ends a typing burst. Defaults to **3 s**.
    pub typing_timeout: Duration,
    /// Backstop expiry for remote typing indicators. Defaults to **10 s**.
    pub remote_typing_expiry: Duration,
    /// Lifetime of a notification. Defaults to **5 s**.
    pub notification_ttl: Duration,
    /// Publish the local status on connect and `OFFLINE` on disconnect.
    pub announce_presence: bool,
    /// Raise a notification for incoming messages, alerts and send errors.
    pub notify_on_incoming: bool,
    /// Re-request room memberships after a reconnect.
    pub rejoin_on_reconnect: bool,
    /// How long [`ChatClient::shutdown`](crate::ChatClient::shutdown) waits
    /// for the session loop before aborting it. Defaults to **1 s**.
    pub shutdown_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            remote_typing_expiry: DEFAULT_REMOTE_TYPING_EXPIRY,
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
            announce_presence: true,
            notify_on_incoming: true,
            rejoin_on_reconnect: true,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ChatConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the connection settings.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the typing silence timeout.
    #[must_use]
    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    /// Set the remote typing backstop expiry.
    #[must_use]
    pub fn with_remote_typing_expiry(mut self, expiry: Duration) -> Self {
        self.remote_typing_expiry = expiry;
        self
    }

    /// Set the notification lifetime.
    #[must_use]
    pub fn with_notification_ttl(mut self, ttl: Duration) -> Self {
        self.notification_ttl = ttl;
        self
    }

    /// Enable or disable presence announcements on connect and disconnect.
    #[must_use]
    pub fn with_announce_presence(mut self, enabled: bool) -> Self {
        self.announce_presence = enabled;
        self
    }

    /// Enable or disable notifications for incoming traffic.
    #[must_use]
    pub fn with_notify_on_incoming(mut self, enabled: bool) -> Self {
        self.notify_on_incoming = enabled;
        self
    }

    /// Enable or disable rejoining rooms after a reconnect.
    #[must_use]
    pub fn with_rejoin_on_reconnect(mut self, enabled: bool) -> Self {
        self.rejoin_on_reconnect = enabled;
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Side effects produced by one session step.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub events: Vec<ChatEvent>,
    pub wire: Vec<ClientMessage>,
}

impl Outcome {
    pub fn wire(message: ClientMessage) -> Self {
        Self {
            events: Vec::new(),
            wire: vec![message],
        }
    }

    fn event(&mut self, event: Option<ChatEvent>) {
        self.events.extend(event);
    }
}

// ── Session ─────────────────────────────────────────────────────────

pub(crate) struct Session {
    pub identity: Identity,
    pub connection: ConnectionMachine,
    pub rooms: RoomSubscriptionRegistry,
    pub presence: PresenceTracker,
    pub typing: TypingIndicatorTracker,
    pub delivery: MessageDeliveryTracker,
    pub notifications: NotificationQueue,
    announce_presence: bool,
    notify_on_incoming: bool,
    rejoin_on_reconnect: bool,
}

impl Session {
    pub fn new(identity: Identity, config: &ChatConfig) -> Self {
        Self {
            connection: ConnectionMachine::new(&config.connection, identity.user_id),
            rooms: RoomSubscriptionRegistry::new(),
            presence: PresenceTracker::new(config.heartbeat_interval),
            typing: TypingIndicatorTracker::new(
                identity.user_id,
                identity.user_name.clone(),
                config.typing_timeout,
                config.remote_typing_expiry,
            ),
            delivery: MessageDeliveryTracker::new(identity.user_id, identity.user_name.clone()),
            notifications: NotificationQueue::new(config.notification_ttl),
            announce_presence: config.announce_presence,
            notify_on_incoming: config.notify_on_incoming,
            rejoin_on_reconnect: config.rejoin_on_reconnect,
            identity,
        }
    }

    fn status_update(&self, status: UserStatus) -> ClientMessage {
        ClientMessage::UpdateUserStatus(UserStatusPayload {
            user_id: self.identity.user_id,
            user_name: self.identity.user_name.clone(),
            status,
        })
    }

    /// Earliest deadline any tracker is waiting for.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.presence.heartbeat_deadline(),
            self.typing.next_deadline(),
            self.notifications.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// A fresh transport is up.
    ///
    /// Returns an empty outcome when the transport is no longer wanted; the
    /// caller must close it.
    pub fn on_established(&mut self, now: Instant) -> Outcome {
        let events = self.connection.on_established();
        if events.is_empty() {
            return Outcome::default();
        }
        let mut out = Outcome {
            events,
            wire: Vec::new(),
        };
        for room_id in self.rooms.on_reconnect(self.rejoin_on_reconnect) {
            debug!(room = room_id, "re-requesting room membership");
            out.wire.push(ClientMessage::JoinRoom(RoomRef { room_id }));
        }
        out.wire.extend(self.typing.resume());
        if self.announce_presence {
            out.wire.push(self.status_update(self.presence.local_status()));
        }
        self.presence.arm_heartbeat(now);
        out
    }

    /// A connect attempt failed or the live transport dropped.
    pub fn on_transport_lost(&mut self, reason: &str) -> Outcome {
        self.presence.cancel_heartbeat();
        self.typing.interrupt();
        Outcome {
            events: self.connection.on_transport_error(reason),
            wire: Vec::new(),
        }
    }

    /// Explicit disconnect. Idempotent: a second call yields nothing.
    ///
    /// Tracker state is dropped even when the connection was already down,
    /// so nothing from a dead session stays queryable.
    pub fn disconnect(&mut self, reason: &str) -> Outcome {
        let was_connected = self.connection.is_connected();
        let mut out = Outcome {
            events: self.connection.disconnect(reason),
            wire: Vec::new(),
        };
        if was_connected && self.announce_presence {
            out.wire.push(self.status_update(UserStatus::Offline));
        }
        self.presence.clear();
        self.typing.clear();
        self.rooms.clear();
        self.notifications.clear();
        out
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Fire every deadline at or before `now`.
    pub fn poll_timers(&mut self, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        if let Some(heartbeat) = self.presence.poll_heartbeat(now, now_millis()) {
            out.wire.push(ClientMessage::Heartbeat(heartbeat));
        }
        let (stop, expired) = self.typing.poll(now);
        out.wire.extend(stop);
        out.events.extend(expired);
        out.events.extend(self.notifications.poll(now));
        out
    }

    // ── Notifications ───────────────────────────────────────────────

    pub fn notify(
        &mut self,
        title: impl Into<String>,
        body: impl Into<String>,
        kind: NotificationKind,
    ) -> NotificationItem {
        self.notifications
            .show(title, body, kind, Instant::now(), now_millis())
    }

    fn notify_incoming(
        &mut self,
        out: &mut Outcome,
        title: impl Into<String>,
        body: impl Into<String>,
        kind: NotificationKind,
    ) {
        if self.notify_on_incoming {
            let item = self.notify(title, body, kind);
            out.events.push(ChatEvent::NotificationShown(item));
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────

    fn incoming_message(&mut self, out: &mut Outcome, payload: ChatMessagePayload, kind: MessageKind) {
        let Some(received) = self.delivery.record_incoming(payload, kind) else {
            return;
        };
        out.wire.push(ClientMessage::MessageDelivered(received.ack));
        let Some(message) = received.message else {
            return;
        };
        let title = match (kind, message.target.room()) {
            (MessageKind::Announcement, Some(room)) => format!("Announcement in room {room}"),
            (MessageKind::Announcement, None) => "Announcement".to_string(),
            (_, Some(room)) => format!("New message in room {room}"),
            (_, None) => format!("New message from {}", message.sender_name),
        };
        let kind = if kind == MessageKind::Announcement {
            NotificationKind::Announcement
        } else {
            NotificationKind::Message
        };
        let body = message.content.clone();
        out.events.push(ChatEvent::MessageReceived(message));
        self.notify_incoming(out, title, body, kind);
    }

    /// Apply one decoded server frame.
    pub fn handle_server(&mut self, message: ServerMessage, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        match message {
            ServerMessage::ConnectionEstablished(data) => {
                out.events.push(ChatEvent::ConnectionEstablished(data));
            }

            // Rooms
            ServerMessage::JoinedRoom(room) => out.event(self.rooms.on_joined(room.room_id)),
            ServerMessage::JoinRoomError(p) => {
                out.event(self.rooms.on_join_error(p.room_id, p.error));
            }
            ServerMessage::LeftRoom(room) => out.event(self.rooms.on_left(room.room_id)),
            ServerMessage::LeaveRoomError(p) => {
                out.event(self.rooms.on_leave_error(p.room_id, p.error));
            }
            ServerMessage::ParticipantsList(p) => out.events.push(ChatEvent::ParticipantsList {
                room_id: p.room_id,
                participants: p.participants,
            }),
            ServerMessage::RoomStatusChanged(data) => {
                out.events.push(ChatEvent::RoomStatusChanged(data));
            }
            ServerMessage::RoomUpdated(data) => out.events.push(ChatEvent::RoomUpdated(data)),
            ServerMessage::ParticipantJoined(data) => {
                out.events.push(ChatEvent::ParticipantJoined(data));
            }
            ServerMessage::ParticipantLeft(data) => {
                out.events.push(ChatEvent::ParticipantLeft(data));
            }
            ServerMessage::RoomWelcome(data) => out.events.push(ChatEvent::RoomWelcome(data)),
            ServerMessage::RoomReminder(data) => {
                let body = data
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                out.events.push(ChatEvent::RoomReminder(data));
                self.notify_incoming(&mut out, "Room reminder", body, NotificationKind::Info);
            }
            ServerMessage::SubscribedToRoom(room) => out.events.push(ChatEvent::SubscribedToRoom {
                room_id: room.room_id,
            }),
            ServerMessage::UnsubscribedFromRoom(room) => {
                out.events.push(ChatEvent::UnsubscribedFromRoom {
                    room_id: room.room_id,
                });
            }
            ServerMessage::EmergencyAlert(alert) => {
                let title = match &alert.room_name {
                    Some(name) => format!("Emergency alert: {name}"),
                    None => "Emergency alert".to_string(),
                };
                let body = alert.message.clone();
                out.events.push(ChatEvent::EmergencyAlert(alert));
                self.notify_incoming(&mut out, title, body, NotificationKind::Alert);
            }
            ServerMessage::EmergencyAlertSent(data) => {
                out.events.push(ChatEvent::EmergencyAlertSent(data));
            }
            ServerMessage::EmergencyAlertError(p) => {
                out.events.push(ChatEvent::EmergencyAlertError { error: p.error });
            }

            // Messages
            ServerMessage::PrivateMessageReceived(p) => {
                self.incoming_message(&mut out, p, MessageKind::Private);
            }
            ServerMessage::RoomMessageReceived(p) => {
                self.incoming_message(&mut out, p, MessageKind::Room);
            }
            ServerMessage::AnnouncementReceived(p) => {
                self.incoming_message(&mut out, p, MessageKind::Announcement);
            }
            ServerMessage::BroadcastSuccess(data) => {
                out.events.push(ChatEvent::BroadcastSuccess(data));
            }
            ServerMessage::BroadcastError(p) => {
                out.events.push(ChatEvent::BroadcastError { error: p.error });
            }
            ServerMessage::MessageDeliveryStatus(p) => {
                out.event(self.delivery.on_delivery_status(p));
            }
            ServerMessage::MessageReadConfirmation(p) => {
                out.events
                    .extend(self.delivery.on_read_confirmation(p, now_millis()));
            }
            ServerMessage::MessageError(p) => {
                warn!("server rejected message: {}", p.error);
                let body = p.error.clone();
                out.events.push(ChatEvent::MessageError { error: p.error });
                self.notify_incoming(&mut out, "Error", body, NotificationKind::Error);
            }

            // Typing
            ServerMessage::UserTypingPrivate(p) => {
                out.event(self.typing.remote_start(p, true, now));
            }
            ServerMessage::UserTypingInRoom(p) => {
                out.event(self.typing.remote_start(p, false, now));
            }
            ServerMessage::UserStoppedTypingPrivate(p) => {
                out.event(self.typing.remote_stop(&p, true));
            }
            ServerMessage::UserStoppedTypingInRoom(p) => {
                out.event(self.typing.remote_stop(&p, false));
            }

            // Presence
            ServerMessage::UserStatusUpdated(p) => {
                out.events.push(self.presence.apply(p, now_millis()));
            }
            ServerMessage::HeartbeatAck(p) => {
                debug!(timestamp = p.timestamp, "heartbeat acknowledged");
                out.events.push(ChatEvent::HeartbeatAck {
                    timestamp: p.timestamp,
                });
            }
        }
        out
    }

    /// Drop every piece of state. Used when the client shuts down.
    pub fn teardown(&mut self) -> Outcome {
        let out = self.disconnect("client shut down");
        self.delivery.clear();
        out
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::protocol::{
        DeliveryStatusPayload, ErrorPayload, MessageType, Target, TypingPayload,
    };
    use crate::rooms::RoomStatus;

    fn connected_session(config: &ChatConfig) -> Session {
        let mut session = Session::new(Identity::new(1, "alice"), config);
        session.connection.start();
        session.on_established(Instant::now());
        session
    }

    fn chat(sender_id: u64, message_id: u64, room_id: Option<u64>) -> ChatMessagePayload {
        ChatMessagePayload {
            message_id,
            sender_id,
            sender_name: "bob".into(),
            content: "hey".into(),
            message_type: MessageType::Text,
            timestamp: 1,
            room_id,
            receiver_id: room_id.map_or(Some(1), |_| None),
        }
    }

    #[test]
    fn config_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.typing_timeout, Duration::from_millis(3000));
        assert_eq!(config.remote_typing_expiry, Duration::from_millis(10_000));
        assert_eq!(config.notification_ttl, Duration::from_millis(5000));
        assert!(config.announce_presence);
        assert!(config.notify_on_incoming);
        assert!(config.rejoin_on_reconnect);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn establishing_announces_online_and_arms_heartbeat() {
        let config = ChatConfig::default();
        let mut session = Session::new(Identity::new(1, "alice"), &config);
        session.connection.start();
        let now = Instant::now();
        let out = session.on_established(now);

        assert_eq!(out.events[0].name(), "connected");
        assert_eq!(
            out.wire,
            vec![ClientMessage::UpdateUserStatus(UserStatusPayload {
                user_id: 1,
                user_name: "alice".into(),
                status: UserStatus::Online,
            })]
        );
        assert_eq!(session.next_deadline(), Some(now + Duration::from_secs(30)));
    }

    #[test]
    fn reconnect_rejoins_rooms() {
        let config = ChatConfig::default().with_announce_presence(false);
        let mut session = connected_session(&config);
        session.rooms.request_join(456);
        session.rooms.on_joined(456);

        session.on_transport_lost("socket closed");
        assert_eq!(session.connection.state(), ConnectionState::Reconnecting);
        assert!(session.next_deadline().is_none());

        let out = session.on_established(Instant::now());
        assert_eq!(
            out.wire,
            vec![ClientMessage::JoinRoom(RoomRef { room_id: 456 })]
        );
        assert_eq!(session.rooms.status(456), RoomStatus::PendingJoin);
    }

    #[test]
    fn disconnect_announces_offline_once_and_clears_deadlines() {
        let config = ChatConfig::default();
        let mut session = connected_session(&config);
        session.typing.set_active_scope(Some(Target::Room(1)));
        session.typing.input(Instant::now()).unwrap();
        session.notify("t", "b", NotificationKind::Info);

        let out = session.disconnect("client disconnect");
        assert_eq!(out.events.len(), 1);
        assert!(matches!(
            out.wire.as_slice(),
            [ClientMessage::UpdateUserStatus(UserStatusPayload {
                status: UserStatus::Offline,
                ..
            })]
        ));
        assert!(session.next_deadline().is_none());

        let again = session.disconnect("client disconnect");
        assert!(again.events.is_empty() && again.wire.is_empty());
    }

    #[test]
    fn incoming_message_is_acked_and_notified() {
        let config = ChatConfig::default();
        let mut session = connected_session(&config);

        let out = session.handle_server(
            ServerMessage::PrivateMessageReceived(chat(2, 10, None)),
            Instant::now(),
        );
        assert!(matches!(
            out.wire.as_slice(),
            [ClientMessage::MessageDelivered(ack)] if ack.message_id == 10 && ack.sender_id == 2
        ));
        let names: Vec<&str> = out.events.iter().map(ChatEvent::name).collect();
        assert_eq!(names, vec!["message_received", "notification_shown"]);
        if let ChatEvent::NotificationShown(item) = &out.events[1] {
            assert_eq!(item.title, "New message from bob");
        }
    }

    #[test]
    fn duplicate_incoming_is_reacked_without_event() {
        let config = ChatConfig::default().with_notify_on_incoming(false);
        let mut session = connected_session(&config);
        let now = Instant::now();
        session.handle_server(ServerMessage::RoomMessageReceived(chat(2, 10, Some(5))), now);

        let out = session.handle_server(ServerMessage::RoomMessageReceived(chat(2, 10, Some(5))), now);
        assert_eq!(out.wire.len(), 1);
        assert!(out.events.is_empty());
        assert_eq!(session.delivery.messages().len(), 1);
    }

    #[test]
    fn message_error_raises_error_notification() {
        let config = ChatConfig::default();
        let mut session = connected_session(&config);
        let out = session.handle_server(
            ServerMessage::MessageError(ErrorPayload {
                error: "too long".into(),
            }),
            Instant::now(),
        );
        match &out.events[..] {
            [ChatEvent::MessageError { error }, ChatEvent::NotificationShown(item)] => {
                assert_eq!(error, "too long");
                assert_eq!(item.kind, NotificationKind::Error);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn room_typing_for_other_room_is_ignored() {
        let config = ChatConfig::default();
        let mut session = connected_session(&config);
        session.typing.set_active_scope(Some(Target::Room(1)));

        let other = TypingPayload::new(2, "bob", Target::Room(9));
        let out = session.handle_server(ServerMessage::UserTypingInRoom(other), Instant::now());
        assert!(out.events.is_empty());

        let same = TypingPayload::new(2, "bob", Target::Room(1));
        let out = session.handle_server(ServerMessage::UserTypingInRoom(same), Instant::now());
        assert_eq!(out.events.len(), 1);
    }

    #[test]
    fn delivery_status_for_unknown_message_is_silent() {
        let config = ChatConfig::default();
        let mut session = connected_session(&config);
        let out = session.handle_server(
            ServerMessage::MessageDeliveryStatus(DeliveryStatusPayload {
                message_id: 1,
                delivered: true,
            }),
            Instant::now(),
        );
        assert!(out.events.is_empty());
    }

    #[test]
    fn heartbeat_fires_on_poll() {
        let config = ChatConfig::default();
        let mut session = Session::new(Identity::new(1, "alice"), &config);
        session.connection.start();
        let start = Instant::now();
        session.on_established(start);

        let out = session.poll_timers(start + Duration::from_secs(30));
        assert!(matches!(out.wire.as_slice(), [ClientMessage::Heartbeat(_)]));
    }

    #[test]
    fn reconnect_closes_typing_burst_cut_short() {
        let config = ChatConfig::default().with_announce_presence(false);
        let mut session = connected_session(&config);
        session.typing.set_active_scope(Some(Target::Room(456)));
        session.typing.input(Instant::now()).unwrap();

        session.on_transport_lost("socket closed");
        assert!(!session.typing.is_typing());

        let out = session.on_established(Instant::now());
        assert_eq!(
            out.wire,
            vec![ClientMessage::TypingStop(TypingPayload::new(
                1,
                "alice",
                Target::Room(456)
            ))]
        );
        assert!(session.on_established(Instant::now()).wire.is_empty());
    }

    #[test]
    fn disconnect_clears_trackers_after_unrecovered_drop() {
        let config = ChatConfig::default()
            .with_connection(ConnectionConfig::default().with_reconnection(false));
        let mut session = connected_session(&config);
        session.rooms.request_join(456);
        session.rooms.on_joined(456);
        session.handle_server(
            ServerMessage::UserStatusUpdated(UserStatusPayload {
                user_id: 2,
                user_name: "bob".into(),
                status: UserStatus::Online,
            }),
            Instant::now(),
        );

        session.on_transport_lost("socket closed");
        assert_eq!(session.connection.state(), ConnectionState::Disconnected);

        let out = session.disconnect("client disconnect");
        assert!(out.events.is_empty() && out.wire.is_empty());
        assert_eq!(session.rooms.status(456), RoomStatus::NotJoined);
        assert!(session.presence.online_users().is_empty());
    }
}
