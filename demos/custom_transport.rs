//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] and [`Connector`] traits with an
//! in-process loopback channel, and drives the client against a tiny fake
//! server. This is useful for:
//!
//! - **Testing**: exercise chat logic without a real server
//! - **Custom backends**: adapt any I/O layer (TCP, QUIC, WebRTC data channels)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chat_sync_client::protocol::{DeliveryStatusPayload, RoomRef};
use chat_sync_client::{
    handler, ChatClient, ChatConfig, ChatError, ChatEvent, ClientMessage, Connector, Identity,
    MessageType, ServerMessage, Transport, TransportKind,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback.
pub struct LoopbackTransport {
    /// Frames the client writes go here (the server reads the other end).
    tx: mpsc::UnboundedSender<String>,
    /// Frames the server writes arrive here.
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half of the loopback.
pub struct LoopbackServer {
    pub rx: mpsc::UnboundedReceiver<String>,
    pub tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement Transport and Connector
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        self.tx
            .send(message)
            .map_err(|e| ChatError::TransportSend(e.to_string()))
    }

    /// Returns `None` once the server half is dropped, which the client
    /// treats as the connection ending.
    ///
    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.rx.close();
        Ok(())
    }
}

/// Hands every connect attempt a fresh loopback and passes the server half
/// to whoever plays the server.
struct LoopbackConnector {
    servers: mpsc::UnboundedSender<LoopbackServer>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(
        &self,
        endpoint: &str,
        identity: &Identity,
        _transports: &[TransportKind],
    ) -> Result<Box<dyn Transport>, ChatError> {
        tracing::info!(endpoint, user = identity.user_id, "opening loopback");
        let (transport, server) = loopback_pair();
        self.servers
            .send(server)
            .map_err(|_| ChatError::TransportClosed)?;
        Ok(Box::new(transport))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: A fake server that acknowledges joins and messages
// ─────────────────────────────────────────────────────────────────────

async fn serve(mut server: LoopbackServer) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    while let Some(raw) = server.rx.recv().await {
        tracing::info!("server received: {raw}");
        let reply = match serde_json::from_str::<ClientMessage>(&raw)? {
            ClientMessage::JoinRoom(room) => Some(ServerMessage::JoinedRoom(room)),
            ClientMessage::LeaveRoom(RoomRef { room_id }) => {
                Some(ServerMessage::LeftRoom(RoomRef { room_id }))
            }
            ClientMessage::SendRoomMessage(message) => {
                Some(ServerMessage::MessageDeliveryStatus(DeliveryStatusPayload {
                    message_id: message.message_id,
                    delivered: true,
                }))
            }
            _ => None,
        };
        if let Some(reply) = reply {
            server.tx.send(serde_json::to_string(&reply)?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (servers_tx, mut servers_rx) = mpsc::unbounded_channel();
    let connector = LoopbackConnector {
        servers: servers_tx,
    };
    tokio::spawn(async move {
        while let Some(server) = servers_rx.recv().await {
            tokio::spawn(async move {
                if let Err(e) = serve(server).await {
                    tracing::warn!("fake server stopped: {e}");
                }
            });
        }
    });

    let mut client = ChatClient::new(
        connector,
        "loopback://demo",
        Identity::new(7, "Alice"),
        ChatConfig::default(),
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ChatEvent>();
    for name in ["connected", "room_joined", "message_delivered"] {
        let events_tx = events_tx.clone();
        client.on(
            name,
            handler(move |event| {
                let _ = events_tx.send(event.clone());
            }),
        );
    }

    client.connect();

    let wait = Duration::from_secs(5);
    while let Ok(Some(event)) = tokio::time::timeout(wait, events_rx.recv()).await {
        tracing::info!("event: {}", event.name());
        match event {
            ChatEvent::Connected { .. } => client.join_room(456)?,
            ChatEvent::RoomJoined { room_id } => {
                let message = client.send_room_message(room_id, "hello", MessageType::Text)?;
                tracing::info!(id = message.message_id, "sent");
            }
            ChatEvent::MessageDelivered { message_id } => {
                tracing::info!(id = message_id, "delivered");
                break;
            }
            _ => {}
        }
    }

    client.shutdown().await;
    tracing::info!("done; custom transport works");
    Ok(())
}
