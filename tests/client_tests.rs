#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests for the chat sync client.
//!
//! Uses the shared `MockServer` from `tests/common` to accept or refuse
//! connections and push server frames, and verifies that `ChatClient`
//! processes them correctly: state transitions, wire traffic, event delivery
//! and timers (under a paused tokio clock).

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_sync_client::protocol::{
    EmergencyAlertPayload, HeartbeatPayload, MessageAckPayload, RoomRef, UserStatusPayload,
};
use chat_sync_client::{
    handler, AlertType, ChatConfig, ChatError, ChatEvent, ClientMessage, ConnectionConfig,
    ConnectionState, Direction, MessageKind, MessageType, NotificationKind, RoomStatus,
    ServerMessage, Target, UserStatus,
};
use tokio_test::{assert_err, assert_ok};

use common::{
    advance, client, connected, delivered, join_room_error, joined_room, leave_room_error,
    left_room, private_message, read, room_message, settle, status, stopped_typing_in_room,
    typing_in_room, typing_private, MockServer, ALICE, BOB,
};

const ROOM: u64 = 456;

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn connect_emits_connected_and_announces_online() {
    let server = MockServer::new();
    let _link = server.accept();
    let (mut client, log) = client(&server, ChatConfig::default());

    assert_eq!(client.state(), ConnectionState::Disconnected);
    client.connect();
    settle().await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(server.endpoints(), vec!["ws://chat.test"]);
    assert_eq!(log.names(), vec!["connected"]);
    assert_eq!(
        server.sent(),
        vec![ClientMessage::UpdateUserStatus(UserStatusPayload {
            user_id: ALICE,
            user_name: "alice".into(),
            status: UserStatus::Online,
        })]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connect_is_a_no_op_while_connected() {
    let (mut client, server, _link, log) = connected(ChatConfig::default()).await;

    client.connect();
    client.reconnect();
    settle().await;

    assert_eq!(server.attempts(), 1);
    assert!(log.names().is_empty());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn operations_fail_while_not_connected() {
    let server = MockServer::new();
    let (mut client, log) = client(&server, ChatConfig::default());

    assert!(matches!(
        assert_err!(client.join_room(ROOM)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.leave_room(ROOM)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.send_room_message(ROOM, "hi", MessageType::Text)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.send_private_message(BOB, "hi", MessageType::Text)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.broadcast_to_room(ROOM, "hi", MessageType::Text)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.mark_read(BOB, 1)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.update_status(UserStatus::Away)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.get_participants(ROOM)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.subscribe_room_updates(ROOM)),
        ChatError::NotConnected
    ));
    assert!(matches!(
        assert_err!(client.send_emergency_alert(ROOM, "fire", AlertType::General)),
        ChatError::NotConnected
    ));
    client.set_active_scope(Some(Target::Room(ROOM)));
    assert!(matches!(
        assert_err!(client.typing_input()),
        ChatError::NotConnected
    ));
    settle().await;

    // Nothing changed and nothing reached the wire.
    assert!(client.messages().is_empty());
    assert_eq!(client.room_status(ROOM), RoomStatus::NotJoined);
    assert_eq!(server.attempts(), 0);
    assert!(server.sent().is_empty());
    assert!(log.names().is_empty());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_attempts_back_off_then_fail_once() {
    let server = MockServer::new();
    let (mut client, log) = client(&server, ChatConfig::default());

    client.connect();
    advance(Duration::from_secs(60)).await;

    assert_eq!(client.state(), ConnectionState::Failed);
    assert_eq!(server.attempts(), 5);

    let attempts: Vec<u32> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            ChatEvent::ConnectionError { attempts, .. } => Some(*attempts),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    assert_eq!(log.count("reconnect_failed"), 1);
    assert!(matches!(
        log.events().last(),
        Some(ChatEvent::ReconnectFailed { attempts: 5, .. })
    ));

    // No further attempts once failed.
    advance(Duration::from_secs(120)).await;
    assert_eq!(server.attempts(), 5);
    assert_eq!(log.count("reconnect_failed"), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_delays_double() {
    let server = MockServer::new();
    let (mut client, _log) = client(&server, ChatConfig::default());

    client.connect();
    settle().await;
    assert_eq!(server.attempts(), 1);

    // Second attempt 1000 ms after the first failure.
    advance(Duration::from_millis(980)).await;
    assert_eq!(server.attempts(), 1);
    advance(Duration::from_millis(40)).await;
    assert_eq!(server.attempts(), 2);

    // Third attempt 2000 ms after the second.
    advance(Duration::from_millis(1940)).await;
    assert_eq!(server.attempts(), 2);
    advance(Duration::from_millis(60)).await;
    assert_eq!(server.attempts(), 3);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_after_failure_resets_attempts() {
    let server = MockServer::new();
    let (mut client, log) = client(&server, ChatConfig::default());
    client.connect();
    advance(Duration::from_secs(60)).await;
    assert_eq!(client.state(), ConnectionState::Failed);
    assert_eq!(client.reconnect_attempts(), 5);

    let _link = server.accept();
    log.clear();
    client.reconnect();
    settle().await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(log.names(), vec!["connected"]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transport_drop_reconnects_and_rejoins_rooms() {
    let (mut client, server, link, log) = connected(ChatConfig::default()).await;
    let second = server.accept();

    assert_ok!(client.join_room(ROOM));
    link.push(&joined_room(ROOM));
    settle().await;
    assert_eq!(client.room_status(ROOM), RoomStatus::Joined);
    server.clear_sent();
    log.clear();

    link.close();
    settle().await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert_eq!(log.names(), vec!["disconnected"]);

    advance(Duration::from_millis(1000)).await;
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(log.names(), vec!["disconnected", "connected", "reconnected"]);
    assert!(matches!(
        log.events().last(),
        Some(ChatEvent::Reconnected { attempts: 1, .. })
    ));
    assert_eq!(
        server.sent(),
        vec![ClientMessage::JoinRoom(RoomRef { room_id: ROOM })]
    );
    assert_eq!(client.room_status(ROOM), RoomStatus::PendingJoin);

    second.push(&joined_room(ROOM));
    settle().await;
    assert_eq!(client.joined_rooms(), vec![ROOM]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn receive_error_is_reported_as_disconnect() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;

    link.fail("boom");
    settle().await;

    assert_eq!(client.state(), ConnectionState::Reconnecting);
    match log.events().as_slice() {
        [ChatEvent::Disconnected {
            reason: Some(reason),
            ..
        }] => assert!(reason.contains("boom"), "reason was {reason}"),
        other => panic!("unexpected events {other:?}"),
    }

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rooms_are_forgotten_when_rejoin_is_off() {
    let (mut client, server, link, _log) =
        connected(ChatConfig::default().with_rejoin_on_reconnect(false)).await;
    let _second = server.accept();
    assert_ok!(client.join_room(ROOM));
    link.push(&joined_room(ROOM));
    settle().await;
    server.clear_sent();

    link.close();
    advance(Duration::from_millis(1000)).await;

    assert!(client.is_connected());
    assert!(server.sent().is_empty());
    assert_eq!(client.room_status(ROOM), RoomStatus::NotJoined);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnection_disabled_stays_disconnected() {
    let config = ChatConfig::default()
        .with_connection(ConnectionConfig::default().with_reconnection(false));
    let (mut client, server, link, log) = connected(config).await;

    link.close();
    advance(Duration::from_secs(30)).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.attempts(), 1);
    assert_eq!(log.count("disconnected"), 1);
    assert_eq!(log.count("reconnect_failed"), 0);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_after_dead_connection_still_clears_state() {
    let config = ChatConfig::default()
        .with_connection(ConnectionConfig::default().with_reconnection(false));
    let (mut client, server, link, log) = connected(config).await;

    assert_ok!(client.join_room(ROOM));
    client.set_active_scope(Some(Target::Room(ROOM)));
    link.push(&joined_room(ROOM));
    link.push(&status(BOB, "bob", UserStatus::Online));
    link.push(&typing_in_room(BOB, ROOM));
    settle().await;
    client.show_notification("Saved", "draft kept", NotificationKind::Info);

    link.close();
    settle().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    server.clear_sent();

    client.disconnect();
    settle().await;

    assert_eq!(client.room_status(ROOM), RoomStatus::NotJoined);
    assert!(client.online_users().is_empty());
    assert!(client.typing_users(Target::Room(ROOM)).is_empty());
    assert!(client.notifications().is_empty());
    assert_eq!(log.count("disconnected"), 1);
    assert!(server.sent().is_empty());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_reannounces_local_status() {
    let server = MockServer::new();
    let link = server.accept();
    let _second = server.accept();
    let (mut client, _log) = client(&server, ChatConfig::default());
    client.connect();
    settle().await;

    assert_ok!(client.update_status(UserStatus::Away));
    settle().await;
    server.clear_sent();

    link.close();
    advance(Duration::from_millis(1000)).await;

    assert_eq!(
        server.sent(),
        vec![ClientMessage::UpdateUserStatus(UserStatusPayload {
            user_id: ALICE,
            user_name: "alice".into(),
            status: UserStatus::Away,
        })]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent_and_clears_state() {
    let server = MockServer::new();
    let link = server.accept();
    let (mut client, log) = client(&server, ChatConfig::default());
    client.connect();
    settle().await;

    assert_ok!(client.join_room(ROOM));
    link.push(&joined_room(ROOM));
    link.push(&status(BOB, "bob", UserStatus::Online));
    settle().await;
    client.show_notification("hello", "world", NotificationKind::Info);
    log.clear();

    client.disconnect();
    client.disconnect();
    settle().await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(log.names(), vec!["disconnected"]);
    assert_eq!(server.closes(), 1);
    assert!(client.joined_rooms().is_empty());
    assert!(client.online_users().is_empty());
    assert!(client.notifications().is_empty());

    let statuses: Vec<UserStatus> = server
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            ClientMessage::UpdateUserStatus(p) => Some(p.status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![UserStatus::Online, UserStatus::Offline]);

    // No reconnection after an explicit disconnect.
    advance(Duration::from_secs(60)).await;
    assert_eq!(server.attempts(), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_transport_and_removes_handlers() {
    let (mut client, server, _link, log) = connected(ChatConfig::default()).await;

    client.shutdown().await;

    assert_eq!(server.closes(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(log.names(), vec!["disconnected"]);
    assert_eq!(client.dispatcher().handler_count("connected"), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_skipped() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;

    link.push_raw("not json at all");
    link.push_raw(r#"{"event":"no_such_event","data":{}}"#);
    link.push(&ServerMessage::HeartbeatAck(HeartbeatPayload { timestamp: 99 }));
    settle().await;

    assert!(client.is_connected());
    assert_eq!(
        log.events(),
        vec![ChatEvent::HeartbeatAck { timestamp: 99 }]
    );

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Event dispatch
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn handlers_run_in_registration_order() {
    let (mut client, _server, link, _log) = connected(ChatConfig::default()).await;
    let calls = Arc::new(Mutex::new(Vec::new()));

    let panicking = handler(|_| panic!("handler failure"));
    client.on("room_joined", panicking);
    for id in 1..=3 {
        let calls = Arc::clone(&calls);
        client.on(
            "room_joined",
            handler(move |_| calls.lock().unwrap().push(id)),
        );
    }
    let removed = {
        let calls = Arc::clone(&calls);
        handler(move |_| calls.lock().unwrap().push(99))
    };
    client.on("room_joined", removed.clone());
    client.off("room_joined", &removed);

    assert_ok!(client.join_room(ROOM));
    link.push(&joined_room(ROOM));
    settle().await;

    assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
    assert!(client.is_connected());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Rooms
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn join_room_ack_and_rejection() {
    let (mut client, server, link, log) = connected(ChatConfig::default()).await;

    assert_ok!(client.join_room(ROOM));
    assert_eq!(client.room_status(ROOM), RoomStatus::PendingJoin);
    settle().await;
    assert_eq!(
        server.sent(),
        vec![ClientMessage::JoinRoom(RoomRef { room_id: ROOM })]
    );
    assert_eq!(
        server.sent_raw(),
        vec![r#"{"event":"join_room","data":{"roomId":456}}"#]
    );

    link.push(&joined_room(ROOM));
    settle().await;
    assert_eq!(client.room_status(ROOM), RoomStatus::Joined);
    assert_eq!(client.joined_rooms(), vec![ROOM]);

    assert_ok!(client.join_room(789));
    link.push(&join_room_error(789, "room full"));
    settle().await;
    assert_eq!(client.room_status(789), RoomStatus::NotJoined);

    assert_eq!(
        log.events(),
        vec![
            ChatEvent::RoomJoined { room_id: ROOM },
            ChatEvent::RoomJoinError {
                room_id: 789,
                reason: Some("room full".into()),
            },
        ]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stale_room_acks_are_ignored() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;

    link.push(&joined_room(999));
    link.push(&left_room(998));
    link.push(&join_room_error(997, "nope"));
    settle().await;

    assert!(log.names().is_empty());
    assert!(client.joined_rooms().is_empty());
    assert_eq!(client.room_status(999), RoomStatus::NotJoined);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn leave_room_flow() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;
    assert_ok!(client.join_room(ROOM));
    link.push(&joined_room(ROOM));
    settle().await;

    assert_ok!(client.leave_room(ROOM));
    assert_eq!(client.room_status(ROOM), RoomStatus::PendingLeave);
    link.push(&leave_room_error(ROOM, "organizer cannot leave"));
    settle().await;
    assert_eq!(client.room_status(ROOM), RoomStatus::Joined);

    assert_ok!(client.leave_room(ROOM));
    link.push(&left_room(ROOM));
    settle().await;
    assert_eq!(client.room_status(ROOM), RoomStatus::NotJoined);
    assert!(client.joined_rooms().is_empty());

    assert_eq!(
        log.names(),
        vec!["room_joined", "room_leave_error", "room_left"]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn join_then_leave_ends_not_joined_whatever_the_ack_order() {
    const OTHER: u64 = 789;
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;

    assert_ok!(client.join_room(ROOM));
    assert_ok!(client.leave_room(ROOM));
    link.push(&left_room(ROOM));
    link.push(&joined_room(ROOM));

    assert_ok!(client.join_room(OTHER));
    assert_ok!(client.leave_room(OTHER));
    link.push(&join_room_error(OTHER, "room is full"));
    link.push(&left_room(OTHER));
    settle().await;

    assert_eq!(client.room_status(ROOM), RoomStatus::NotJoined);
    assert_eq!(client.room_status(OTHER), RoomStatus::NotJoined);
    assert!(client.joined_rooms().is_empty());
    assert_eq!(log.names(), vec!["room_left", "room_left"]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_leave_of_unconfirmed_room_does_not_join_it() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;

    assert_ok!(client.leave_room(ROOM));
    link.push(&leave_room_error(ROOM, "not a member"));
    settle().await;
    assert_eq!(client.room_status(ROOM), RoomStatus::NotJoined);

    assert_ok!(client.join_room(ROOM));
    assert_ok!(client.leave_room(ROOM));
    link.push(&join_room_error(ROOM, "banned"));
    link.push(&leave_room_error(ROOM, "not a member"));
    settle().await;
    assert_eq!(client.room_status(ROOM), RoomStatus::NotJoined);
    assert!(client.joined_rooms().is_empty());
    assert_eq!(log.names(), vec!["room_leave_error", "room_leave_error"]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn room_queries_and_subscriptions_hit_the_wire() {
    let (mut client, server, _link, _log) = connected(ChatConfig::default()).await;

    assert_ok!(client.get_participants(ROOM));
    assert_ok!(client.subscribe_room_updates(ROOM));
    assert_ok!(client.unsubscribe_room_updates(ROOM));
    assert_ok!(client.send_emergency_alert(ROOM, "storm incoming", AlertType::Weather));
    settle().await;

    let sent = server.sent();
    assert_eq!(
        server.sent_names(),
        vec![
            "get_participants",
            "subscribe_room_updates",
            "unsubscribe_room_updates",
            "send_emergency_alert"
        ]
    );
    match &sent[3] {
        ClientMessage::SendEmergencyAlert(alert) => {
            assert_eq!(alert.room_id, ROOM);
            assert_eq!(alert.message, "storm incoming");
            assert_eq!(alert.alert_type, AlertType::Weather);
        }
        other => panic!("expected SendEmergencyAlert, got {other:?}"),
    }

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn emergency_alert_raises_notification() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;

    link.push(&ServerMessage::EmergencyAlert(EmergencyAlertPayload {
        room_id: Some(ROOM),
        room_name: Some("Sunset Hike".into()),
        alert_type: AlertType::Weather,
        message: "Lightning nearby".into(),
        severity: Some("high".into()),
        timestamp: 1,
    }));
    settle().await;

    assert_eq!(log.names(), vec!["emergency_alert", "notification_shown"]);
    let notifications = client.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Emergency alert: Sunset Hike");
    assert_eq!(notifications[0].body, "Lightning nearby");
    assert_eq!(notifications[0].kind, NotificationKind::Alert);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Messages and receipts
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn outgoing_message_receipts_only_move_forward() {
    let (mut client, server, link, log) = connected(ChatConfig::default()).await;

    let message = assert_ok!(client.send_room_message(ROOM, "hello", MessageType::Text));
    assert!(!message.delivered && !message.read);
    assert_eq!(message.direction, Direction::Outgoing);
    assert_eq!(message.kind, MessageKind::Room);
    assert_eq!(client.messages(), vec![message.clone()]);
    settle().await;
    assert_eq!(
        server.sent(),
        vec![ClientMessage::SendRoomMessage(message.to_payload())]
    );

    link.push(&delivered(message.message_id));
    settle().await;
    let stored = client.message(ALICE, message.message_id).unwrap();
    assert!(stored.delivered && !stored.read);

    link.push(&read(message.message_id, 42));
    link.push(&delivered(message.message_id));
    settle().await;
    let stored = client.message(ALICE, message.message_id).unwrap();
    assert!(stored.delivered && stored.read);
    assert_eq!(stored.read_at, Some(42));

    assert_eq!(
        log.events(),
        vec![
            ChatEvent::MessageDelivered {
                message_id: message.message_id
            },
            ChatEvent::MessageRead {
                message_id: message.message_id,
                read_at: Some(42)
            },
        ]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn read_before_delivery_marks_both() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;

    let message = assert_ok!(client.send_private_message(BOB, "psst", MessageType::Text));
    assert_eq!(message.target, Target::Peer(BOB));
    link.push(&read(message.message_id, 7));
    settle().await;

    let stored = client.message(ALICE, message.message_id).unwrap();
    assert!(stored.delivered && stored.read);
    assert_eq!(log.names(), vec!["message_delivered", "message_read"]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn message_ids_are_unique_and_increasing() {
    let (mut client, _server, _link, _log) = connected(ChatConfig::default()).await;

    let ids: Vec<u64> = (0..5)
        .map(|i| {
            client
                .broadcast_to_room(ROOM, format!("m{i}"), MessageType::Text)
                .unwrap()
                .message_id
        })
        .collect();

    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "{ids:?}");
    assert!(client
        .messages()
        .iter()
        .all(|m| m.kind == MessageKind::Broadcast));

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn incoming_message_is_acked_once_stored_and_reacked_on_duplicate() {
    let (mut client, server, link, log) = connected(ChatConfig::default()).await;

    link.push(&room_message(BOB, 10, ROOM));
    settle().await;

    let ack = ClientMessage::MessageDelivered(MessageAckPayload {
        message_id: 10,
        sender_id: BOB,
    });
    assert_eq!(server.sent(), vec![ack.clone()]);
    let stored = client.message(BOB, 10).unwrap();
    assert!(stored.delivered);
    assert_eq!(stored.direction, Direction::Incoming);
    assert_eq!(stored.target, Target::Room(ROOM));
    assert_eq!(log.names(), vec!["message_received", "notification_shown"]);
    assert_eq!(client.notifications()[0].title, "New message in room 456");

    link.push(&room_message(BOB, 10, ROOM));
    settle().await;
    assert_eq!(server.sent(), vec![ack.clone(), ack]);
    assert_eq!(client.messages().len(), 1);
    assert_eq!(log.count("message_received"), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn own_echo_is_ignored() {
    let (mut client, server, link, log) = connected(ChatConfig::default()).await;

    link.push(&room_message(ALICE, 11, ROOM));
    settle().await;

    assert!(client.messages().is_empty());
    assert!(server.sent().is_empty());
    assert!(log.names().is_empty());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn mark_read_sends_receipt() {
    let (mut client, server, link, _log) =
        connected(ChatConfig::default().with_notify_on_incoming(false)).await;

    link.push(&private_message(BOB, 20));
    settle().await;
    server.clear_sent();

    assert_ok!(client.mark_read(BOB, 20));
    settle().await;

    assert_eq!(
        server.sent(),
        vec![ClientMessage::MarkMessageRead(MessageAckPayload {
            message_id: 20,
            sender_id: BOB,
        })]
    );
    let stored = client.message(BOB, 20).unwrap();
    assert!(stored.read);
    assert!(stored.read_at.is_some());
    assert!(client.notifications().is_empty());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Presence
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn heartbeat_every_interval_until_disconnect() {
    let (mut client, server, _link, _log) = connected(ChatConfig::default()).await;

    advance(Duration::from_secs(29)).await;
    assert_eq!(server.count_sent("heartbeat"), 0);
    advance(Duration::from_secs(1)).await;
    assert_eq!(server.count_sent("heartbeat"), 1);
    advance(Duration::from_secs(30)).await;
    assert_eq!(server.count_sent("heartbeat"), 2);

    client.disconnect();
    advance(Duration::from_secs(120)).await;
    assert_eq!(server.count_sent("heartbeat"), 2);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn presence_tracks_peer_status() {
    let (mut client, server, link, log) = connected(ChatConfig::default()).await;

    link.push(&status(BOB, "bob", UserStatus::Away));
    settle().await;
    assert_eq!(client.status_of(BOB), Some(UserStatus::Away));
    let online = client.online_users();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].user_name, "bob");

    link.push(&status(BOB, "bob", UserStatus::Offline));
    settle().await;
    assert!(client.online_users().is_empty());
    assert_eq!(client.status_of(BOB), None);
    assert_eq!(log.count("user_status_updated"), 2);

    assert_ok!(client.update_status(UserStatus::Busy));
    settle().await;
    assert_eq!(
        server.sent(),
        vec![ClientMessage::UpdateUserStatus(UserStatusPayload {
            user_id: ALICE,
            user_name: "alice".into(),
            status: UserStatus::Busy,
        })]
    );

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Typing
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn typing_burst_sends_one_start_and_one_stop() {
    let (mut client, server, _link, _log) = connected(ChatConfig::default()).await;
    client.set_active_scope(Some(Target::Room(ROOM)));

    for _ in 0..5 {
        assert_ok!(client.typing_input());
        advance(Duration::from_millis(500)).await;
    }
    assert_eq!(server.sent_names(), vec!["typing_start"]);

    // Last keystroke was about 500 ms ago; the stop is due 3000 ms after it.
    advance(Duration::from_millis(2400)).await;
    assert_eq!(server.count_sent("typing_stop"), 0);
    advance(Duration::from_millis(200)).await;
    assert_eq!(server.sent_names(), vec!["typing_start", "typing_stop"]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn burst_cut_by_reconnect_is_stopped_before_the_next_start() {
    let (mut client, server, link, _log) = connected(ChatConfig::default()).await;
    let _second = server.accept();
    client.set_active_scope(Some(Target::Room(ROOM)));

    assert_ok!(client.typing_input());
    link.close();
    advance(Duration::from_millis(1000)).await;
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(server.sent_names(), vec!["typing_start", "typing_stop"]);

    assert_ok!(client.typing_input());
    advance(Duration::from_millis(3100)).await;
    assert_eq!(
        server.sent_names(),
        vec!["typing_start", "typing_stop", "typing_start", "typing_stop"]
    );
    assert!(server.sent().iter().all(|m| matches!(
        m,
        ClientMessage::TypingStart(p) | ClientMessage::TypingStop(p) if p.room_id == Some(ROOM)
    )));

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sending_into_active_scope_stops_typing() {
    let (mut client, server, _link, _log) = connected(ChatConfig::default()).await;
    client.set_active_scope(Some(Target::Room(ROOM)));

    assert_ok!(client.typing_input());
    assert_ok!(client.send_room_message(ROOM, "done", MessageType::Text));
    advance(Duration::from_secs(5)).await;

    assert_eq!(
        server.sent_names(),
        vec!["typing_start", "typing_stop", "send_room_message"]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn typing_requires_active_scope() {
    let (mut client, server, _link, _log) = connected(ChatConfig::default()).await;

    assert!(matches!(
        assert_err!(client.typing_input()),
        ChatError::NoActiveScope
    ));
    client.stop_typing();
    settle().await;
    assert!(server.sent().is_empty());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn remote_typing_expires_without_stop_signal() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;
    client.set_active_scope(Some(Target::Room(ROOM)));

    link.push(&typing_in_room(BOB, ROOM));
    settle().await;
    assert_eq!(
        client.typing_users(Target::Room(ROOM)),
        vec![(BOB, "bob".to_string())]
    );

    advance(Duration::from_millis(9900)).await;
    assert_eq!(client.typing_users(Target::Room(ROOM)).len(), 1);
    advance(Duration::from_millis(200)).await;
    assert!(client.typing_users(Target::Room(ROOM)).is_empty());

    assert_eq!(
        log.events(),
        vec![
            ChatEvent::UserTyping {
                user_id: BOB,
                user_name: "bob".into(),
                scope: Target::Room(ROOM),
            },
            ChatEvent::UserStoppedTyping {
                user_id: BOB,
                scope: Target::Room(ROOM),
                expired: true,
            },
        ]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn remote_typing_stop_and_scoping() {
    let (mut client, _server, link, log) = connected(ChatConfig::default()).await;
    client.set_active_scope(Some(Target::Room(ROOM)));

    // Typing in a room we are not looking at is dropped.
    link.push(&typing_in_room(BOB, 999));
    link.push(&typing_in_room(BOB, ROOM));
    link.push(&stopped_typing_in_room(BOB, ROOM));
    link.push(&typing_private(BOB));
    settle().await;

    assert!(client.typing_users(Target::Room(ROOM)).is_empty());
    assert_eq!(
        client.typing_users(Target::Peer(BOB)),
        vec![(BOB, "bob".to_string())]
    );
    assert_eq!(
        log.names(),
        vec!["user_typing", "user_stopped_typing", "user_typing"]
    );

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Notifications
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn notification_expires_after_ttl() {
    let (mut client, _server, _link, log) = connected(ChatConfig::default()).await;

    let item = client.show_notification("Saved", "Your draft was saved", NotificationKind::Info);
    assert_eq!(client.notifications(), vec![item.clone()]);

    advance(Duration::from_millis(4900)).await;
    assert_eq!(client.notifications().len(), 1);
    advance(Duration::from_millis(200)).await;
    assert!(client.notifications().is_empty());

    assert_eq!(
        log.events(),
        vec![
            ChatEvent::NotificationShown(item.clone()),
            ChatEvent::NotificationDismissed {
                id: item.id,
                expired: true,
            },
        ]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dismiss_removes_notification_early() {
    let server = MockServer::new();
    let (mut client, log) = client(&server, ChatConfig::default());

    // Notifications work without a connection.
    let item = client.show_notification("Hi", "there", NotificationKind::Message);
    assert!(client.dismiss(item.id));
    assert!(!client.dismiss(item.id));
    advance(Duration::from_secs(10)).await;

    assert_eq!(
        log.names(),
        vec!["notification_shown", "notification_dismissed"]
    );
    assert!(matches!(
        log.events().last(),
        Some(ChatEvent::NotificationDismissed { expired: false, .. })
    ));

    client.shutdown().await;
}
