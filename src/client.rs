//! Async client for the chat sync protocol.
//!
//! [`ChatClient`] is a thin handle over a background *session loop*. The loop
//! owns the transport: it opens it through a [`Connector`], reconnects with
//! backoff when it drops, decodes inbound frames, and fires timers. The handle
//! and the loop share one session state behind a mutex; application calls mutate
//! it directly and queue their wire frames to the loop over an unbounded MPSC
//! channel.
//!
//! Events are delivered to callbacks registered with [`ChatClient::on`].
//!
//! # Example
//!
//! ```rust,ignore
//! let client = ChatClient::new(
//!     WebSocketConnector::new(),
//!     "ws://localhost:3001",
//!     Identity::new(7, "Alice"),
//!     ChatConfig::default(),
//! );
//! client.on("connected", handler(|_| println!("online")));
//! client.connect();
//!
//! client.join_room(456)?;
//! client.send_room_message(456, "hello", MessageType::Text)?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connection::{ConnectionState, Identity, TransportKind};
use crate::delivery::{Message, MessageKind};
use crate::dispatcher::{EventDispatcher, Handler};
use crate::error::{ChatError, Result};
use crate::event::ChatEvent;
use crate::notifications::{NotificationItem, NotificationKind};
use crate::presence::PresenceEntry;
use crate::protocol::{
    now_millis, AlertType, ChatMessagePayload, ClientMessage, EmergencyAlertRequest, MessageId,
    MessageType, RoomId, RoomRef, ServerMessage, Target, UserId, UserStatus, UserStatusPayload,
};
use crate::rooms::RoomStatus;
use crate::session::{ChatConfig, Outcome, Session};
use crate::transport::{Connector, Transport};

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>>> + Send>>;

/// Commands from the handle to the session loop.
#[derive(Debug)]
enum Command {
    /// Write a frame to the live transport.
    Send(ClientMessage),
    /// Close the live transport.
    Close,
    /// State changed; re-evaluate deadlines and connect attempts.
    Wake,
}

/// State shared between the handle and the session loop.
struct Shared {
    session: Mutex<Session>,
    dispatcher: EventDispatcher,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, events: &[ChatEvent]) {
        for event in events {
            self.dispatcher.emit(event);
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the chat sync protocol.
///
/// Created via [`ChatClient::new`], which spawns the session loop and must be
/// called from within a tokio runtime. The client starts `Disconnected`;
/// register handlers, then call [`connect`](Self::connect).
///
/// Operations that need the server return [`ChatError::NotConnected`] without
/// touching any state when the connection is not up.
pub struct ChatClient {
    shared: Arc<Shared>,
    /// Sender half of the command channel to the session loop.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Handle to the background session loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the session loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ChatClient {
    /// Create a client and spawn its session loop.
    pub fn new(
        connector: impl Connector,
        endpoint: impl Into<String>,
        identity: Identity,
        config: ChatConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(Shared {
            session: Mutex::new(Session::new(identity.clone(), &config)),
            dispatcher: EventDispatcher::new(),
        });

        let dialer = Dialer {
            connector: Arc::new(connector),
            endpoint: endpoint.into(),
            identity,
            transports: config.connection.transports.clone(),
            timeout: config.connection.timeout,
        };

        let task = tokio::spawn(session_loop(
            dialer,
            Arc::clone(&shared),
            cmd_rx,
            shutdown_rx,
        ));

        Self {
            shared,
            cmd_tx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    // ── Callbacks ───────────────────────────────────────────────────

    /// Register `handler` for events named `event` (see [`ChatEvent::name`]).
    pub fn on(&self, event: impl Into<String>, handler: Handler) {
        self.shared.dispatcher.on(event, handler);
    }

    /// Remove the first registration of `handler` for `event`.
    pub fn off(&self, event: &str, handler: &Handler) {
        self.shared.dispatcher.off(event, handler);
    }

    /// The dispatcher behind [`on`](Self::on) / [`off`](Self::off).
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.shared.dispatcher
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Start connecting. A no-op unless `Disconnected` or `Failed`.
    ///
    /// Failures are never returned; they drive the reconnection state machine
    /// and surface as `connection_error` / `reconnect_failed` events.
    pub fn connect(&self) {
        if self.shared.session().connection.start() {
            self.wake();
        }
    }

    /// Manual reconnect after `Failed` or `Disconnected`, with the attempt
    /// counter reset. A no-op while connected or connecting.
    pub fn reconnect(&self) {
        if self.shared.session().connection.manual_reconnect() {
            self.wake();
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Announces `OFFLINE` first when presence announcements are on. Clears
    /// rooms, presence, typing and notifications. Calling it again does
    /// nothing.
    pub fn disconnect(&self) {
        let outcome = self.shared.session().disconnect("client disconnect");
        if outcome.events.is_empty() {
            return;
        }
        self.apply(outcome);
        self.command(Command::Close);
    }

    /// Shut the client down, closing the transport and stopping the session
    /// loop. Every handler is removed afterwards.
    pub async fn shutdown(&mut self) {
        debug!("ChatClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Abort the loop if it does not exit in time so it cannot detach.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        let outcome = self.shared.session().teardown();
        self.shared.dispatch(&outcome.events);
        self.shared.dispatcher.clear();
    }

    // ── Rooms ───────────────────────────────────────────────────────

    /// Request membership of `room`.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn join_room(&self, room: RoomId) -> Result<()> {
        self.gated(|session| {
            session.rooms.request_join(room);
            Ok(((), Outcome::wire(ClientMessage::JoinRoom(RoomRef { room_id: room }))))
        })
    }

    /// Request leaving `room`.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn leave_room(&self, room: RoomId) -> Result<()> {
        self.gated(|session| {
            session.rooms.request_leave(room);
            Ok(((), Outcome::wire(ClientMessage::LeaveRoom(RoomRef { room_id: room }))))
        })
    }

    /// Ask for the participants of `room`; the answer arrives as a
    /// `participants_list` event.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn get_participants(&self, room: RoomId) -> Result<()> {
        self.fire(ClientMessage::GetParticipants(RoomRef { room_id: room }))
    }

    /// Subscribe to status and detail updates of `room` without joining it.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn subscribe_room_updates(&self, room: RoomId) -> Result<()> {
        self.fire(ClientMessage::SubscribeRoomUpdates(RoomRef { room_id: room }))
    }

    /// Cancel a room update subscription.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn unsubscribe_room_updates(&self, room: RoomId) -> Result<()> {
        self.fire(ClientMessage::UnsubscribeRoomUpdates(RoomRef { room_id: room }))
    }

    /// Send an emergency alert to everyone in `room`.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn send_emergency_alert(
        &self,
        room: RoomId,
        message: impl Into<String>,
        alert_type: AlertType,
    ) -> Result<()> {
        self.fire(ClientMessage::SendEmergencyAlert(EmergencyAlertRequest {
            room_id: room,
            message: message.into(),
            alert_type,
            timestamp: now_millis(),
        }))
    }

    /// Membership status of `room`.
    pub fn room_status(&self, room: RoomId) -> RoomStatus {
        self.shared.session().rooms.status(room)
    }

    /// Rooms the server has confirmed, in ascending id order.
    pub fn joined_rooms(&self) -> Vec<RoomId> {
        self.shared.session().rooms.joined_rooms()
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Send a chat message into `room`.
    ///
    /// The message is in [`messages`](Self::messages) with `delivered = false`
    /// before the frame is queued.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn send_room_message(
        &self,
        room: RoomId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Result<Message> {
        self.send_chat(
            MessageKind::Room,
            Target::Room(room),
            content.into(),
            message_type,
            ClientMessage::SendRoomMessage,
        )
    }

    /// Send a direct message to `peer`.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn send_private_message(
        &self,
        peer: UserId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Result<Message> {
        self.send_chat(
            MessageKind::Private,
            Target::Peer(peer),
            content.into(),
            message_type,
            ClientMessage::SendPrivateMessage,
        )
    }

    /// Broadcast a message to every participant of `room`.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn broadcast_to_room(
        &self,
        room: RoomId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Result<Message> {
        self.send_chat(
            MessageKind::Broadcast,
            Target::Room(room),
            content.into(),
            message_type,
            ClientMessage::BroadcastToRoom,
        )
    }

    /// Mark a received message read and send the read receipt.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn mark_read(&self, sender: UserId, message_id: MessageId) -> Result<()> {
        self.gated(|session| {
            let ack = session.delivery.mark_read(sender, message_id, now_millis());
            Ok(((), Outcome::wire(ClientMessage::MarkMessageRead(ack))))
        })
    }

    /// Every message of the session, in append order.
    pub fn messages(&self) -> Vec<Message> {
        self.shared.session().delivery.messages().to_vec()
    }

    /// Look up a message by sender and id.
    pub fn message(&self, sender: UserId, message_id: MessageId) -> Option<Message> {
        self.shared
            .session()
            .delivery
            .message(sender, message_id)
            .cloned()
    }

    // ── Presence ────────────────────────────────────────────────────

    /// Publish the local presence status.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up.
    pub fn update_status(&self, status: UserStatus) -> Result<()> {
        self.gated(|session| {
            session.presence.set_local_status(status);
            let update = UserStatusPayload {
                user_id: session.identity.user_id,
                user_name: session.identity.user_name.clone(),
                status,
            };
            Ok(((), Outcome::wire(ClientMessage::UpdateUserStatus(update))))
        })
    }

    /// Peers not known to be offline.
    pub fn online_users(&self) -> Vec<PresenceEntry> {
        self.shared.session().presence.online_users()
    }

    /// Last known status of `user`.
    pub fn status_of(&self, user: UserId) -> Option<UserStatus> {
        self.shared.session().presence.status_of(user)
    }

    // ── Typing ──────────────────────────────────────────────────────

    /// Select the room or peer the local user is typing into.
    pub fn set_active_scope(&self, scope: Option<Target>) {
        let stop = self.shared.session().typing.set_active_scope(scope);
        self.apply(Outcome {
            events: Vec::new(),
            wire: stop.into_iter().collect(),
        });
    }

    /// Register a keystroke in the active scope.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] when the connection is not up, or
    /// [`ChatError::NoActiveScope`] when no scope is selected.
    pub fn typing_input(&self) -> Result<()> {
        self.gated(|session| {
            let start = session.typing.input(Instant::now())?;
            Ok((
                (),
                Outcome {
                    events: Vec::new(),
                    wire: start.into_iter().collect(),
                },
            ))
        })
    }

    /// End the current typing burst now. Does nothing when not typing.
    pub fn stop_typing(&self) {
        let stop = self.shared.session().typing.stop();
        self.apply(Outcome {
            events: Vec::new(),
            wire: stop.into_iter().collect(),
        });
    }

    /// Peers currently typing in `scope`, as `(user id, display name)`.
    pub fn typing_users(&self, scope: Target) -> Vec<(UserId, String)> {
        self.shared.session().typing.typing_users(scope)
    }

    // ── Notifications ───────────────────────────────────────────────

    /// Show a notification that disappears after the configured TTL.
    pub fn show_notification(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        kind: NotificationKind,
    ) -> NotificationItem {
        let item = self.shared.session().notify(title, body, kind);
        self.apply(Outcome {
            events: vec![ChatEvent::NotificationShown(item.clone())],
            wire: Vec::new(),
        });
        item
    }

    /// Remove a notification before its TTL. Returns `false` if it was
    /// already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let event = self.shared.session().notifications.dismiss(id);
        let dismissed = event.is_some();
        self.apply(Outcome {
            events: event.into_iter().collect(),
            wire: Vec::new(),
        });
        dismissed
    }

    /// Live notifications, oldest first.
    pub fn notifications(&self) -> Vec<NotificationItem> {
        self.shared.session().notifications.items()
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.session().connection.state()
    }

    /// Returns `true` while the transport is up.
    pub fn is_connected(&self) -> bool {
        self.shared.session().connection.is_connected()
    }

    /// Consecutive failed connection attempts.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.session().connection.attempts()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn command(&self, command: Command) {
        if self.cmd_tx.send(command).is_err() {
            debug!("session loop gone, dropping command");
        }
    }

    fn wake(&self) {
        self.command(Command::Wake);
    }

    /// Dispatch the outcome's events and queue its frames to the loop.
    fn apply(&self, outcome: Outcome) {
        if outcome.wire.is_empty() {
            self.wake();
        }
        for message in outcome.wire {
            self.command(Command::Send(message));
        }
        self.shared.dispatch(&outcome.events);
    }

    /// Run `op` against the session only while connected.
    fn gated<T>(&self, op: impl FnOnce(&mut Session) -> Result<(T, Outcome)>) -> Result<T> {
        let (value, outcome) = {
            let mut session = self.shared.session();
            if !session.connection.is_connected() {
                return Err(ChatError::NotConnected);
            }
            op(&mut session)?
        };
        self.apply(outcome);
        Ok(value)
    }

    fn fire(&self, message: ClientMessage) -> Result<()> {
        self.gated(|_| Ok(((), Outcome::wire(message))))
    }

    fn send_chat(
        &self,
        kind: MessageKind,
        target: Target,
        content: String,
        message_type: MessageType,
        frame: fn(ChatMessagePayload) -> ClientMessage,
    ) -> Result<Message> {
        self.gated(|session| {
            let message =
                session
                    .delivery
                    .record_outgoing(kind, target, content, message_type, now_millis());
            let mut outcome = Outcome::default();
            outcome.wire.extend(session.typing.on_message_sent(target));
            outcome.wire.push(frame(message.to_payload()));
            Ok((message, outcome))
        })
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("state", &self.state())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // No executor is available to drive a graceful close here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Everything needed to open a fresh transport.
struct Dialer {
    connector: Arc<dyn Connector>,
    endpoint: String,
    identity: Identity,
    transports: Vec<TransportKind>,
    timeout: Duration,
}

impl Dialer {
    /// One connect attempt: wait `delay`, then connect within the timeout.
    fn attempt(&self, delay: Duration) -> ConnectFuture {
        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        let identity = self.identity.clone();
        let transports = self.transports.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            if !delay.is_zero() {
                debug!("next connection attempt in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            tokio::time::timeout(timeout, connector.connect(&endpoint, &identity, &transports))
                .await
                .map_err(|_| ChatError::Timeout)?
        })
    }
}

async fn recv_from(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn finish_connect(pending: &mut Option<ConnectFuture>) -> Result<Box<dyn Transport>> {
    match pending {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Serialize and write every frame. Stops at the first transport failure.
async fn write_frames(transport: &mut dyn Transport, frames: Vec<ClientMessage>) -> Result<()> {
    for frame in frames {
        match serde_json::to_string(&frame) {
            Ok(json) => {
                debug!(event = frame.event_name(), "sending client message");
                transport.send(json).await?;
            }
            Err(e) => error!("failed to serialize ClientMessage: {e}"),
        }
    }
    Ok(())
}

/// Background loop that owns the transport and all timers.
///
/// Exits on the shutdown signal or when the command channel closes.
async fn session_loop(
    dialer: Dialer,
    shared: Arc<Shared>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("session loop started");

    let mut transport: Option<Box<dyn Transport>> = None;
    let mut pending: Option<ConnectFuture> = None;

    loop {
        let deadline = {
            let session = shared.session();
            let wants = session.connection.wants_transport();
            if wants && transport.is_none() && pending.is_none() {
                pending = Some(dialer.attempt(session.connection.backoff_delay()));
            } else if !wants && pending.is_some() {
                debug!("dropping in-flight connection attempt");
                pending = None;
            }
            session.next_deadline()
        };

        let mut outcome = Outcome::default();
        let mut lost: Option<String> = None;

        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let outcome = shared.session().teardown();
                if let Some(mut live) = transport.take() {
                    if let Err(e) = write_frames(live.as_mut(), outcome.wire).await {
                        debug!("failed to announce shutdown: {e}");
                    }
                    let _ = live.close().await;
                }
                shared.dispatch(&outcome.events);
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Send(message)) => outcome.wire.push(message),
                    Some(Command::Close) => {
                        if let Some(mut live) = transport.take() {
                            debug!("closing transport");
                            let _ = live.close().await;
                        }
                    }
                    Some(Command::Wake) => {}
                    // Command channel closed: client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        if let Some(mut live) = transport.take() {
                            let _ = live.close().await;
                        }
                        break;
                    }
                }
            }

            result = finish_connect(&mut pending) => {
                pending = None;
                match result {
                    Ok(mut fresh) => {
                        outcome = shared.session().on_established(Instant::now());
                        if outcome.events.is_empty() {
                            debug!("connection no longer wanted, closing it");
                            let _ = fresh.close().await;
                        } else {
                            info!(endpoint = %dialer.endpoint, "connected");
                            transport = Some(fresh);
                        }
                    }
                    Err(e) => {
                        warn!("connection attempt failed: {e}");
                        outcome = shared.session().on_transport_lost(&e.to_string());
                    }
                }
            }

            incoming = recv_from(&mut transport) => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            debug!(event = message.event_name(), "received server message");
                            outcome = shared.session().handle_server(message, Instant::now());
                        }
                        Err(e) => {
                            warn!("failed to deserialize server message: {e} (raw: {text})");
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        lost = Some(e.to_string());
                    }
                    None => {
                        debug!("transport closed by server");
                        lost = Some("transport closed by server".to_string());
                    }
                }
            }

            _ = sleep_until_opt(deadline) => {
                outcome = shared.session().poll_timers(Instant::now());
            }
        }

        if !outcome.wire.is_empty() {
            let frames = std::mem::take(&mut outcome.wire);
            match transport.as_mut() {
                Some(live) => {
                    if let Err(e) = write_frames(live.as_mut(), frames).await {
                        error!("transport send error: {e}");
                        lost = Some(e.to_string());
                    }
                }
                None => debug!("no transport, dropping {} outgoing frame(s)", frames.len()),
            }
        }

        if let Some(reason) = lost {
            if let Some(mut dead) = transport.take() {
                let _ = dead.close().await;
            }
            let dropped = shared.session().on_transport_lost(&reason);
            outcome.events.extend(dropped.events);
        }

        shared.dispatch(&outcome.events);
    }

    debug!("session loop exited");
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::dispatcher::handler;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Records sent frames and replays scripted inbound ones.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                // Script exhausted: stay open until closed from our side.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out one scripted transport per successful attempt and fails
    /// once the scripts run out.
    struct MockConnector {
        scripts: StdMutex<VecDeque<Vec<Option<Result<String>>>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(
            &self,
            _endpoint: &str,
            _identity: &Identity,
            _transports: &[TransportKind],
        ) -> Result<Box<dyn Transport>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ChatError::TransportClosed)?;
            Ok(Box::new(MockTransport {
                incoming: VecDeque::from(script),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    struct Harness {
        client: ChatClient,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        attempts: Arc<AtomicUsize>,
        events: Arc<StdMutex<Vec<String>>>,
    }

    fn harness(scripts: Vec<Vec<Option<Result<String>>>>, config: ChatConfig) -> Harness {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = MockConnector {
            scripts: StdMutex::new(VecDeque::from(scripts)),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            attempts: Arc::clone(&attempts),
        };
        let client = ChatClient::new(connector, "ws://test", Identity::new(1, "alice"), config);

        let events = Arc::new(StdMutex::new(Vec::new()));
        for name in ["connected", "disconnected", "connection_error", "reconnect_failed"] {
            let log = Arc::clone(&events);
            client.on(
                name,
                handler(move |e| log.lock().unwrap().push(e.name().to_string())),
            );
        }
        Harness {
            client,
            sent,
            closed,
            attempts,
            events,
        }
    }

    fn sent_events(sent: &StdMutex<Vec<String>>) -> Vec<String> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|raw| {
                let msg: ClientMessage = serde_json::from_str(raw).unwrap();
                msg.event_name().to_string()
            })
            .collect()
    }

    /// Let the session loop run until it has nothing left to do.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn connect_announces_online() {
        let mut h = harness(vec![vec![]], ChatConfig::default());
        h.client.connect();
        settle().await;

        assert!(h.client.is_connected());
        assert_eq!(sent_events(&h.sent), vec!["update_user_status"]);
        assert_eq!(*h.events.lock().unwrap(), vec!["connected"]);

        h.client.shutdown().await;
        assert!(h.closed.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn operations_fail_while_disconnected() {
        let mut h = harness(vec![], ChatConfig::default());

        assert!(matches!(h.client.join_room(1), Err(ChatError::NotConnected)));
        assert!(matches!(
            h.client.send_room_message(1, "x", MessageType::Text),
            Err(ChatError::NotConnected)
        ));
        assert!(h.client.messages().is_empty());
        assert_eq!(h.client.room_status(1), RoomStatus::NotJoined);
        settle().await;
        assert!(h.sent.lock().unwrap().is_empty());

        h.client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_back_off_then_fail() {
        let config = ChatConfig::default();
        let mut h = harness(vec![], config);
        h.client.connect();

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.client.state(), ConnectionState::Failed);
        assert_eq!(h.attempts.load(Ordering::SeqCst), 5);
        let log = h.events.lock().unwrap().clone();
        assert_eq!(
            log.iter().filter(|n| *n == "connection_error").count(),
            5
        );
        assert_eq!(
            log.iter().filter(|n| *n == "reconnect_failed").count(),
            1
        );

        h.client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_twice_is_idempotent() {
        let mut h = harness(vec![vec![]], ChatConfig::default());
        h.client.connect();
        settle().await;

        h.client.disconnect();
        h.client.disconnect();
        settle().await;

        assert_eq!(h.client.state(), ConnectionState::Disconnected);
        assert!(h.closed.load(Ordering::Relaxed));
        let log = h.events.lock().unwrap().clone();
        assert_eq!(log, vec!["connected", "disconnected"]);
        let statuses = sent_events(&h.sent)
            .into_iter()
            .filter(|e| e == "update_user_status")
            .count();
        // ONLINE on connect, OFFLINE once on disconnect.
        assert_eq!(statuses, 2);

        h.client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn drop_aborts_session_loop() {
        let h = harness(vec![vec![]], ChatConfig::default());
        h.client.connect();
        settle().await;
        drop(h.client);
        settle().await;
    }
}
