//! # Room Chat Example
//!
//! Demonstrates a complete chat client lifecycle over WebSocket:
//!
//! 1. Connect (and keep reconnecting) to a chat server
//! 2. Join a room once connected
//! 3. Send a message and watch delivery and read receipts arrive
//! 4. React to peers' messages, typing and presence
//! 5. Shut down gracefully on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start a chat server on localhost:3001, then:
//! cargo run --example room_chat
//!
//! # Override the server URL, user and room:
//! CHAT_URL=ws://my-server:3001 CHAT_USER=42 CHAT_ROOM=7 cargo run --example room_chat
//! ```

use chat_sync_client::{
    handler, ChatClient, ChatConfig, ChatEvent, Identity, MessageType, NotificationKind,
    WebSocketConnector,
};
use tokio::sync::mpsc;

/// Default server URL when `CHAT_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:3001";

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("CHAT_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let user_id: u64 = env_or("CHAT_USER", 7);
    let room_id: u64 = env_or("CHAT_ROOM", 456);
    tracing::info!("Connecting to {url} as user {user_id}");

    let mut client = ChatClient::new(
        WebSocketConnector::new(),
        url,
        Identity::new(user_id, format!("user-{user_id}")),
        ChatConfig::default(),
    );

    // Forward the events this demo cares about into a channel so the main
    // loop can call back into the client.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChatEvent>();
    for name in [
        "connected",
        "reconnected",
        "disconnected",
        "connection_error",
        "reconnect_failed",
        "room_joined",
        "room_join_error",
        "message_received",
        "message_delivered",
        "message_read",
        "user_typing",
        "user_status_updated",
        "notification_shown",
    ] {
        let event_tx = event_tx.clone();
        client.on(
            name,
            handler(move |event| {
                let _ = event_tx.send(event.clone());
            }),
        );
    }

    client.connect();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };

                match event {
                    ChatEvent::Connected { .. } => {
                        tracing::info!("Connected, joining room {room_id}");
                        client.join_room(room_id)?;
                    }

                    ChatEvent::Reconnected { attempts, .. } => {
                        tracing::info!("Back online after {attempts} failed attempt(s)");
                    }

                    ChatEvent::RoomJoined { room_id } => {
                        let message = client.send_room_message(room_id, "hello from Rust", MessageType::Text)?;
                        tracing::info!("Joined room {room_id}, sent message {}", message.message_id);
                    }

                    ChatEvent::RoomJoinError { room_id, reason } => {
                        tracing::error!("Could not join room {room_id}: {}", reason.as_deref().unwrap_or("unknown"));
                        break;
                    }

                    ChatEvent::MessageReceived(message) => {
                        tracing::info!("{}: {}", message.sender_name, message.content);
                        client.mark_read(message.sender_id, message.message_id)?;
                    }

                    ChatEvent::MessageDelivered { message_id } => {
                        tracing::info!("Message {message_id} delivered");
                    }

                    ChatEvent::MessageRead { message_id, .. } => {
                        tracing::info!("Message {message_id} read");
                    }

                    ChatEvent::UserTyping { user_name, .. } => {
                        tracing::info!("{user_name} is typing...");
                    }

                    ChatEvent::UserStatusUpdated { user_name, status, .. } => {
                        tracing::info!("{user_name} is now {status:?}");
                    }

                    ChatEvent::NotificationShown(item) if item.kind == NotificationKind::Alert => {
                        tracing::warn!("{}: {}", item.title, item.body);
                    }

                    ChatEvent::Disconnected { reason, .. } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                    }

                    ChatEvent::ReconnectFailed { attempts, .. } => {
                        tracing::error!("Giving up after {attempts} attempt(s)");
                        break;
                    }

                    other => {
                        tracing::debug!("Event: {other:?}");
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.disconnect();
    client.shutdown().await;
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}
