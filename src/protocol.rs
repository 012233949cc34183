//! Wire-compatible protocol types for the chat sync protocol.
//!
//! Every frame is a JSON object with an `event` name and a `data` payload:
//!
//! ```json
//! {"event": "join_room", "data": {"roomId": 456}}
//! ```
//!
//! Payload fields use `camelCase`, enum values use `SCREAMING_SNAKE_CASE`, and
//! timestamps are milliseconds since the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for users.
pub type UserId = u64;

/// Unique identifier for rooms (activities).
pub type RoomId = u64;

/// Client-generated message identifier.
pub type MessageId = u64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

// ── Enums ───────────────────────────────────────────────────────────

/// Presence status of a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    #[default]
    Online,
    Away,
    Busy,
    Offline,
}

/// Kind of chat message content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    SystemNotification,
    RoomAnnouncement,
}

/// Category of an emergency alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Weather,
    Security,
    Medical,
    #[default]
    General,
}

/// Where a message or typing signal is directed: a room or a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// A room (activity) channel.
    Room(RoomId),
    /// A direct conversation with one peer.
    Peer(UserId),
}

impl Target {
    /// Returns the room id when this is a room target.
    pub fn room(&self) -> Option<RoomId> {
        match self {
            Self::Room(id) => Some(*id),
            Self::Peer(_) => None,
        }
    }

    /// Returns the peer id when this is a peer target.
    pub fn peer(&self) -> Option<UserId> {
        match self {
            Self::Peer(id) => Some(*id),
            Self::Room(_) => None,
        }
    }

    /// Builds a target from the `roomId` / `receiverId` wire fields.
    ///
    /// The room wins when both are present.
    pub fn from_fields(room_id: Option<RoomId>, receiver_id: Option<UserId>) -> Option<Self> {
        room_id.map(Self::Room).or(receiver_id.map(Self::Peer))
    }
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload naming a single room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: RoomId,
}

/// A room-scoped rejection from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomErrorPayload {
    pub room_id: RoomId,
    #[serde(default, alias = "reason", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A free-form error description from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    #[serde(alias = "message")]
    pub error: String,
}

/// Participant list returned for a `get_participants` query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsListPayload {
    pub room_id: RoomId,
    #[serde(default)]
    pub participants: Vec<serde_json::Value>,
}

/// A chat message as it travels on the wire, in either direction.
///
/// Exactly one of `room_id` / `receiver_id` is populated for outgoing
/// messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub message_id: MessageId,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
}

impl ChatMessagePayload {
    /// Returns the room or peer this message is addressed to.
    pub fn target(&self) -> Option<Target> {
        Target::from_fields(self.room_id, self.receiver_id)
    }
}

/// Typing signal payload, scoped to a room or a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
}

impl TypingPayload {
    /// Create a payload with exactly one scope field populated.
    pub fn new(user_id: UserId, user_name: impl Into<String>, scope: Target) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            room_id: scope.room(),
            receiver_id: scope.peer(),
        }
    }

    /// Returns the scope this signal applies to, if any field is populated.
    pub fn scope(&self) -> Option<Target> {
        Target::from_fields(self.room_id, self.receiver_id)
    }
}

/// Presence status update, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: String,
    pub status: UserStatus,
}

/// Acknowledgment referencing a message by id and original sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageAckPayload {
    pub message_id: MessageId,
    pub sender_id: UserId,
}

/// Server report that an outgoing message reached its recipient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusPayload {
    pub message_id: MessageId,
    #[serde(default = "default_true")]
    pub delivered: bool,
}

fn default_true() -> bool {
    true
}

/// Server report that the recipient read an outgoing message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadConfirmationPayload {
    pub message_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<Timestamp>,
}

/// Outgoing emergency alert request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlertRequest {
    pub room_id: RoomId,
    pub message: String,
    pub alert_type: AlertType,
    pub timestamp: Timestamp,
}

/// Incoming emergency alert broadcast to a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlertPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(default)]
    pub alert_type: AlertType,
    #[serde(default, alias = "alertMessage")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// Timestamp echoed back by the server for a heartbeat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub timestamp: Timestamp,
}

// ── Messages ────────────────────────────────────────────────────────

/// Events sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request membership of a room.
    JoinRoom(RoomRef),
    /// Request leaving a room.
    LeaveRoom(RoomRef),
    /// Ask for a room's participant list; answered by `participants_list`.
    GetParticipants(RoomRef),
    /// Subscribe to room status/update notifications without joining chat.
    SubscribeRoomUpdates(RoomRef),
    /// Cancel a room update subscription.
    UnsubscribeRoomUpdates(RoomRef),
    /// Broadcast a message to every participant of a room.
    BroadcastToRoom(ChatMessagePayload),
    /// Send a direct message to one peer.
    SendPrivateMessage(ChatMessagePayload),
    /// Send a chat message into a room.
    SendRoomMessage(ChatMessagePayload),
    /// Local user started typing.
    TypingStart(TypingPayload),
    /// Local user stopped typing.
    TypingStop(TypingPayload),
    /// Publish the local user's presence status.
    UpdateUserStatus(UserStatusPayload),
    /// Periodic liveness heartbeat.
    Heartbeat(HeartbeatPayload),
    /// Automatic delivery acknowledgment for a received message.
    MessageDelivered(MessageAckPayload),
    /// Explicit read receipt for a received message.
    MarkMessageRead(MessageAckPayload),
    /// Send an emergency alert to a room (organizer only).
    SendEmergencyAlert(EmergencyAlertRequest),
}

impl ClientMessage {
    /// The wire event name of this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join_room",
            Self::LeaveRoom(_) => "leave_room",
            Self::GetParticipants(_) => "get_participants",
            Self::SubscribeRoomUpdates(_) => "subscribe_room_updates",
            Self::UnsubscribeRoomUpdates(_) => "unsubscribe_room_updates",
            Self::BroadcastToRoom(_) => "broadcast_to_room",
            Self::SendPrivateMessage(_) => "send_private_message",
            Self::SendRoomMessage(_) => "send_room_message",
            Self::TypingStart(_) => "typing_start",
            Self::TypingStop(_) => "typing_stop",
            Self::UpdateUserStatus(_) => "update_user_status",
            Self::Heartbeat(_) => "heartbeat",
            Self::MessageDelivered(_) => "message_delivered",
            Self::MarkMessageRead(_) => "mark_message_read",
            Self::SendEmergencyAlert(_) => "send_emergency_alert",
        }
    }
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Server-side confirmation of the handshake.
    ConnectionEstablished(serde_json::Value),
    /// Join request accepted.
    JoinedRoom(RoomRef),
    /// Join request rejected.
    JoinRoomError(RoomErrorPayload),
    /// Leave request accepted.
    LeftRoom(RoomRef),
    /// Leave request rejected.
    LeaveRoomError(RoomErrorPayload),
    /// Answer to a `get_participants` query.
    ParticipantsList(ParticipantsListPayload),
    /// A room's lifecycle status changed.
    RoomStatusChanged(serde_json::Value),
    /// A room's details (time, location, ...) changed.
    RoomUpdated(serde_json::Value),
    /// Someone joined a room.
    ParticipantJoined(serde_json::Value),
    /// Someone left a room.
    ParticipantLeft(serde_json::Value),
    /// Welcome message for a newly joined participant.
    RoomWelcome(serde_json::Value),
    /// Scheduled reminder about a room.
    RoomReminder(serde_json::Value),
    /// Emergency alert broadcast to a room.
    EmergencyAlert(EmergencyAlertPayload),
    /// Our emergency alert was delivered.
    EmergencyAlertSent(serde_json::Value),
    /// Our emergency alert was rejected.
    EmergencyAlertError(ErrorPayload),
    /// Room update subscription confirmed.
    SubscribedToRoom(RoomRef),
    /// Room update subscription cancelled.
    UnsubscribedFromRoom(RoomRef),
    /// Direct message from a peer.
    PrivateMessageReceived(ChatMessagePayload),
    /// Chat message in a room.
    RoomMessageReceived(ChatMessagePayload),
    /// Announcement in a room.
    AnnouncementReceived(ChatMessagePayload),
    /// Our broadcast was delivered.
    BroadcastSuccess(serde_json::Value),
    /// Our broadcast was rejected.
    BroadcastError(ErrorPayload),
    /// A peer started typing to us.
    UserTypingPrivate(TypingPayload),
    /// A peer stopped typing to us.
    UserStoppedTypingPrivate(TypingPayload),
    /// A peer started typing in a room.
    UserTypingInRoom(TypingPayload),
    /// A peer stopped typing in a room.
    UserStoppedTypingInRoom(TypingPayload),
    /// A peer's presence status changed.
    UserStatusUpdated(UserStatusPayload),
    /// Delivery status of one of our messages.
    MessageDeliveryStatus(DeliveryStatusPayload),
    /// Read confirmation of one of our messages.
    MessageReadConfirmation(ReadConfirmationPayload),
    /// Server acknowledged a heartbeat.
    HeartbeatAck(HeartbeatPayload),
    /// A send was rejected.
    MessageError(ErrorPayload),
}

impl ServerMessage {
    /// The wire event name of this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished(_) => "connection_established",
            Self::JoinedRoom(_) => "joined_room",
            Self::JoinRoomError(_) => "join_room_error",
            Self::LeftRoom(_) => "left_room",
            Self::LeaveRoomError(_) => "leave_room_error",
            Self::ParticipantsList(_) => "participants_list",
            Self::RoomStatusChanged(_) => "room_status_changed",
            Self::RoomUpdated(_) => "room_updated",
            Self::ParticipantJoined(_) => "participant_joined",
            Self::ParticipantLeft(_) => "participant_left",
            Self::RoomWelcome(_) => "room_welcome",
            Self::RoomReminder(_) => "room_reminder",
            Self::EmergencyAlert(_) => "emergency_alert",
            Self::EmergencyAlertSent(_) => "emergency_alert_sent",
            Self::EmergencyAlertError(_) => "emergency_alert_error",
            Self::SubscribedToRoom(_) => "subscribed_to_room",
            Self::UnsubscribedFromRoom(_) => "unsubscribed_from_room",
            Self::PrivateMessageReceived(_) => "private_message_received",
            Self::RoomMessageReceived(_) => "room_message_received",
            Self::AnnouncementReceived(_) => "announcement_received",
            Self::BroadcastSuccess(_) => "broadcast_success",
            Self::BroadcastError(_) => "broadcast_error",
            Self::UserTypingPrivate(_) => "user_typing_private",
            Self::UserStoppedTypingPrivate(_) => "user_stopped_typing_private",
            Self::UserTypingInRoom(_) => "user_typing_in_room",
            Self::UserStoppedTypingInRoom(_) => "user_stopped_typing_in_room",
            Self::UserStatusUpdated(_) => "user_status_updated",
            Self::MessageDeliveryStatus(_) => "message_delivery_status",
            Self::MessageReadConfirmation(_) => "message_read_confirmation",
            Self::HeartbeatAck(_) => "heartbeat_ack",
            Self::MessageError(_) => "message_error",
        }
    }
}
