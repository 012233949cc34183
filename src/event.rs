//! Application-facing events emitted through the [`EventDispatcher`](crate::EventDispatcher).
//!
//! Each [`ChatEvent`] has a stable snake_case [`name`](ChatEvent::name) which
//! is the key handlers are registered under.

use uuid::Uuid;

use crate::delivery::Message;
use crate::notifications::NotificationItem;
use crate::protocol::{
    EmergencyAlertPayload, MessageId, RoomId, Target, Timestamp, UserId, UserStatus,
};

/// An event delivered to application callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    // ── Lifecycle ───────────────────────────────────────────────────
    /// The transport is up (first connect or any reconnect).
    Connected {
        user_id: UserId,
        timestamp: Timestamp,
    },
    /// The transport went down, either by request or because it dropped.
    Disconnected {
        reason: Option<String>,
        timestamp: Timestamp,
    },
    /// A connection attempt failed.
    ConnectionError {
        error: String,
        attempts: u32,
        timestamp: Timestamp,
    },
    /// The transport came back after `attempts` failures.
    Reconnected {
        attempts: u32,
        timestamp: Timestamp,
    },
    /// Reconnection gave up after `attempts` failures. Fires once per outage.
    ReconnectFailed {
        attempts: u32,
        timestamp: Timestamp,
    },
    /// The server confirmed the handshake.
    ConnectionEstablished(serde_json::Value),

    // ── Rooms ───────────────────────────────────────────────────────
    RoomJoined {
        room_id: RoomId,
    },
    RoomJoinError {
        room_id: RoomId,
        reason: Option<String>,
    },
    RoomLeft {
        room_id: RoomId,
    },
    RoomLeaveError {
        room_id: RoomId,
        reason: Option<String>,
    },
    ParticipantsList {
        room_id: RoomId,
        participants: Vec<serde_json::Value>,
    },
    RoomStatusChanged(serde_json::Value),
    RoomUpdated(serde_json::Value),
    ParticipantJoined(serde_json::Value),
    ParticipantLeft(serde_json::Value),
    RoomWelcome(serde_json::Value),
    RoomReminder(serde_json::Value),
    SubscribedToRoom {
        room_id: RoomId,
    },
    UnsubscribedFromRoom {
        room_id: RoomId,
    },
    EmergencyAlert(EmergencyAlertPayload),
    EmergencyAlertSent(serde_json::Value),
    EmergencyAlertError {
        error: String,
    },

    // ── Messages ────────────────────────────────────────────────────
    /// A peer's message was appended to the session log.
    MessageReceived(Message),
    /// One of our messages reached its recipient.
    MessageDelivered {
        message_id: MessageId,
    },
    /// One of our messages was read.
    MessageRead {
        message_id: MessageId,
        read_at: Option<Timestamp>,
    },
    BroadcastSuccess(serde_json::Value),
    BroadcastError {
        error: String,
    },
    /// The server rejected a send.
    MessageError {
        error: String,
    },

    // ── Typing ──────────────────────────────────────────────────────
    UserTyping {
        user_id: UserId,
        user_name: String,
        scope: Target,
    },
    /// A peer stopped typing; `expired` is set when the stop signal never
    /// arrived and the entry timed out.
    UserStoppedTyping {
        user_id: UserId,
        scope: Target,
        expired: bool,
    },

    // ── Presence ────────────────────────────────────────────────────
    UserStatusUpdated {
        user_id: UserId,
        user_name: String,
        status: UserStatus,
    },
    /// Informational only; not used for liveness.
    HeartbeatAck {
        timestamp: Timestamp,
    },

    // ── Notifications ───────────────────────────────────────────────
    NotificationShown(NotificationItem),
    NotificationDismissed {
        id: Uuid,
        expired: bool,
    },
}

impl ChatEvent {
    /// The name handlers for this event are registered under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::ConnectionError { .. } => "connection_error",
            Self::Reconnected { .. } => "reconnected",
            Self::ReconnectFailed { .. } => "reconnect_failed",
            Self::ConnectionEstablished(_) => "connection_established",
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomJoinError { .. } => "room_join_error",
            Self::RoomLeft { .. } => "room_left",
            Self::RoomLeaveError { .. } => "room_leave_error",
            Self::ParticipantsList { .. } => "participants_list",
            Self::RoomStatusChanged(_) => "room_status_changed",
            Self::RoomUpdated(_) => "room_updated",
            Self::ParticipantJoined(_) => "participant_joined",
            Self::ParticipantLeft(_) => "participant_left",
            Self::RoomWelcome(_) => "room_welcome",
            Self::RoomReminder(_) => "room_reminder",
            Self::SubscribedToRoom { .. } => "subscribed_to_room",
            Self::UnsubscribedFromRoom { .. } => "unsubscribed_from_room",
            Self::EmergencyAlert(_) => "emergency_alert",
            Self::EmergencyAlertSent(_) => "emergency_alert_sent",
            Self::EmergencyAlertError { .. } => "emergency_alert_error",
            Self::MessageReceived(_) => "message_received",
            Self::MessageDelivered { .. } => "message_delivered",
            Self::MessageRead { .. } => "message_read",
            Self::BroadcastSuccess(_) => "broadcast_success",
            Self::BroadcastError { .. } => "broadcast_error",
            Self::MessageError { .. } => "message_error",
            Self::UserTyping { .. } => "user_typing",
            Self::UserStoppedTyping { .. } => "user_stopped_typing",
            Self::UserStatusUpdated { .. } => "user_status_updated",
            Self::HeartbeatAck { .. } => "heartbeat_ack",
            Self::NotificationShown(_) => "notification_shown",
            Self::NotificationDismissed { .. } => "notification_dismissed",
        }
    }
}
