//! WebSocket connector and transport built on `tokio-tungstenite`.
//!
//! A [`ChatClient`](crate::ChatClient) normally gets a [`WebSocketConnector`].
//! Each connection attempt opens a new [`WebSocketTransport`], with the user id
//! carried in the handshake query string. `wss://` endpoints go through
//! `tokio-tungstenite`'s TLS-capable stream.
//!
//! Requires the `transport-websocket` feature (enabled by default).
//!
//! ```rust,no_run
//! use chat_sync_client::{ChatClient, ChatConfig, Identity, WebSocketConnector};
//!
//! # async fn run() {
//! let client = ChatClient::new(
//!     WebSocketConnector::new(),
//!     "wss://chat.example.com/socket",
//!     Identity::new(7, "alice"),
//!     ChatConfig::default(),
//! );
//! client.connect();
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::connection::{Identity, TransportKind};
use crate::error::ChatError;
use crate::transport::{Connector, Transport};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the handshake URL: `endpoint` plus a `userId` query parameter.
pub fn handshake_url(endpoint: &str, identity: &Identity) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}userId={}", identity.user_id)
}

/// Opens a [`WebSocketTransport`] for each connection attempt.
///
/// Long polling has no implementation here. The connector skips
/// [`TransportKind::Polling`] entries, and if the list has no WebSocket entry
/// it fails with [`ChatError::UnsupportedTransport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        endpoint: &str,
        identity: &Identity,
        transports: &[TransportKind],
    ) -> Result<Box<dyn Transport>, ChatError> {
        if !transports.contains(&TransportKind::WebSocket) {
            return Err(ChatError::UnsupportedTransport(transports.last().copied()));
        }
        if transports.first() == Some(&TransportKind::Polling) {
            tracing::debug!("polling unavailable, falling back to websocket");
        }
        let transport = WebSocketTransport::open(&handshake_url(endpoint, identity)).await?;
        Ok(Box::new(transport))
    }
}

/// One WebSocket connection carrying JSON text frames.
///
/// `recv` only awaits the next stream item, so it is cancel-safe inside
/// `tokio::select!`. Binary frames are dropped. Ping and pong frames are
/// handled inside tungstenite.
#[derive(Debug)]
pub struct WebSocketTransport {
    socket: Socket,
    open: bool,
}

/// What a single incoming WebSocket message means for the chat layer.
enum Inbound {
    Frame(String),
    Closed,
    Ignored,
}

impl From<Message> for Inbound {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Inbound::Frame(text.to_string()),
            Message::Close(close) => {
                tracing::debug!(?close, "server closed the chat socket");
                Inbound::Closed
            }
            Message::Binary(bytes) => {
                tracing::warn!(len = bytes.len(), "dropping binary frame");
                Inbound::Ignored
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Ignored,
        }
    }
}

/// Maps a handshake failure to [`ChatError::Io`], keeping the I/O error kind
/// when there is one.
fn handshake_error(error: tungstenite::Error) -> ChatError {
    match error {
        tungstenite::Error::Io(io) => ChatError::Io(io),
        other => ChatError::Io(std::io::Error::other(other)),
    }
}

impl WebSocketTransport {
    /// Performs the WebSocket handshake against `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Io`] when the URL is malformed, the host cannot
    /// be reached or the server rejects the upgrade.
    pub async fn open(url: &str) -> Result<Self, ChatError> {
        tracing::debug!(%url, "opening chat socket");
        let (socket, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(handshake_error)?;
        tracing::info!(%url, status = %response.status(), "chat socket open");
        Ok(Self { socket, open: true })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        if !self.open {
            return Err(ChatError::TransportClosed);
        }
        self.socket
            .send(Message::text(message))
            .await
            .map_err(|e| ChatError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        while let Some(item) = self.socket.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => return Some(Err(ChatError::TransportReceive(e.to_string()))),
            };
            match Inbound::from(message) {
                Inbound::Frame(text) => return Some(Ok(text)),
                Inbound::Closed => return None,
                Inbound::Ignored => {}
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        if !std::mem::replace(&mut self.open, false) {
            return Ok(());
        }
        self.socket
            .close(None)
            .await
            .map_err(|e| ChatError::TransportSend(e.to_string()))
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
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    type ServerSocket = WebSocketStream<TcpStream>;

    /// Accepts one WebSocket connection on an ephemeral port, reports the
    /// request URI and hands the socket to `script`.
    async fn chat_server<F, Fut>(script: F) -> (String, oneshot::Receiver<String>)
    where
        F: FnOnce(ServerSocket) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/", listener.local_addr().unwrap());
        let (uri_tx, uri_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let record = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let _ = uri_tx.send(req.uri().to_string());
                Ok(resp)
            };
            let socket = tokio_tungstenite::accept_hdr_async(tcp, record)
                .await
                .unwrap();
            script(socket).await;
        });

        (endpoint, uri_rx)
    }

    async fn drain(mut socket: ServerSocket) {
        while let Some(Ok(_)) = socket.next().await {}
    }

    fn alice() -> Identity {
        Identity::new(42, "alice")
    }

    #[test]
    fn handshake_url_adds_user_id() {
        assert_eq!(
            handshake_url("ws://localhost:3001", &alice()),
            "ws://localhost:3001?userId=42"
        );
        assert_eq!(
            handshake_url("ws://localhost:3001/socket?v=2", &alice()),
            "ws://localhost:3001/socket?v=2&userId=42"
        );
    }

    #[test]
    fn transport_can_move_into_the_session_task() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn polling_only_preference_is_unsupported() {
        let result = WebSocketConnector::new()
            .connect("ws://127.0.0.1:1", &alice(), &[TransportKind::Polling])
            .await;
        assert!(matches!(
            result,
            Err(ChatError::UnsupportedTransport(Some(TransportKind::Polling)))
        ));
    }

    #[tokio::test]
    async fn empty_preference_is_unsupported() {
        let result = WebSocketConnector::new()
            .connect("ws://127.0.0.1:1", &alice(), &[])
            .await;
        assert!(matches!(result, Err(ChatError::UnsupportedTransport(None))));
    }

    #[tokio::test]
    async fn bad_endpoints_fail_as_io() {
        for url in ["definitely not a url", "ws://127.0.0.1:1"] {
            let err = WebSocketTransport::open(url).await.unwrap_err();
            assert!(matches!(err, ChatError::Io(_)), "{url}: {err:?}");
        }
    }

    #[tokio::test]
    async fn connector_falls_back_from_polling_and_sends_user_id() {
        let (endpoint, uri) = chat_server(drain).await;

        let mut transport = WebSocketConnector::new()
            .connect(
                &endpoint,
                &alice(),
                &[TransportKind::Polling, TransportKind::WebSocket],
            )
            .await
            .unwrap();

        assert_eq!(uri.await.unwrap(), "/?userId=42");
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (endpoint, _) = chat_server(|mut socket| async move {
            let Some(Ok(Message::Text(frame))) = socket.next().await else {
                panic!("expected a text frame");
            };
            let reply = frame.replace("join_room", "joined_room");
            socket.send(Message::text(reply)).await.unwrap();
            socket.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::open(&endpoint).await.unwrap();
        transport
            .send(r#"{"event":"join_room","data":{"roomId":456}}"#.to_string())
            .await
            .unwrap();

        let reply = transport.recv().await.unwrap().unwrap();
        assert_eq!(reply, r#"{"event":"joined_room","data":{"roomId":456}}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_dropped() {
        let (endpoint, _) = chat_server(|mut socket| async move {
            socket
                .send(Message::binary(vec![1_u8, 2, 3]))
                .await
                .unwrap();
            socket
                .send(Message::text(r#"{"event":"heartbeat_ack"}"#))
                .await
                .unwrap();
            socket.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::open(&endpoint).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"event":"heartbeat_ack"}"#);
    }

    #[tokio::test]
    async fn closed_transport_rejects_sends_and_closes_twice() {
        let (endpoint, _) = chat_server(drain).await;

        let mut transport = WebSocketTransport::open(&endpoint).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, ChatError::TransportClosed));
        assert!(!matches!(transport.recv().await, Some(Ok(_))));
    }
}
