//! Connection lifecycle state machine and its configuration.
//!
//! [`ConnectionMachine`] is the pure, synchronous half of the connection
//! manager: it owns the [`ConnectionState`] and the reconnect counter and
//! turns transport outcomes into lifecycle [`ChatEvent`]s. The async half that
//! actually opens transports and sleeps between attempts lives in the client's
//! session loop.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!                               │                 │
//!                             error             error
//!                               ▼                 ▼
//!                          Reconnecting ◀─────────┘   (attempts += 1)
//!                            │      │
//!                           ok    attempts == max
//!                            ▼      ▼
//!                      Connected   Failed ──manual reconnect──▶ Connecting
//! ```

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::event::ChatEvent;
use crate::protocol::{now_millis, UserId};

/// Default number of failed attempts before giving up.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnect attempt.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default cap for the exponential backoff.
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5000);

/// Default bound on a single connect attempt.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20_000);

// ── Configuration ───────────────────────────────────────────────────

/// A transport flavour a connector may be asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// A persistent WebSocket.
    WebSocket,
    /// HTTP long-polling.
    Polling,
}

/// Connection and reconnection settings.
///
/// # Example
///
/// ```
/// use chat_sync_client::connection::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default()
///     .with_max_attempts(3)
///     .with_base_delay(Duration::from_millis(250));
/// assert_eq!(config.max_attempts, 3);
/// assert!(config.reconnection);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Ordered transport preference list. Defaults to WebSocket, then polling.
    pub transports: Vec<TransportKind>,
    /// Whether a lost transport is re-established automatically.
    pub reconnection: bool,
    /// Failed attempts tolerated before entering [`ConnectionState::Failed`].
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further attempt.
    pub base_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_delay: Duration,
    /// Bound on each individual connect attempt.
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            reconnection: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Set the ordered transport preference list.
    #[must_use]
    pub fn with_transports(mut self, transports: Vec<TransportKind>) -> Self {
        self.transports = transports;
        self
    }

    /// Enable or disable automatic reconnection.
    #[must_use]
    pub fn with_reconnection(mut self, enabled: bool) -> Self {
        self.reconnection = enabled;
        self
    }

    /// Set the number of failed attempts before giving up.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial backoff delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Who the client connects as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque user id sent with the handshake.
    pub user_id: UserId,
    /// Display name used in typing and presence payloads.
    pub user_name: String,
}

impl Identity {
    /// Create a new identity.
    pub fn new(user_id: UserId, user_name: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
        }
    }
}

// ── State machine ───────────────────────────────────────────────────

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal until a manual reconnect.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Connection state machine with a bounded reconnect counter.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    reconnection: bool,
    base_delay: Duration,
    max_delay: Duration,
    user_id: UserId,
}

impl ConnectionMachine {
    /// Create a machine in [`ConnectionState::Disconnected`].
    pub fn new(config: &ConnectionConfig, user_id: UserId) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts: config.max_attempts,
            reconnection: config.reconnection,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            user_id,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` while the transport is up.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Returns `true` when a connect attempt should be in flight.
    pub fn wants_transport(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            info!("connection state: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Begin connecting from `Disconnected` or `Failed`.
    ///
    /// Resets the attempt counter. Returns `false` (and does nothing) when a
    /// connection is already up or being established, so at most one attempt
    /// is ever in flight.
    pub fn start(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.attempts = 0;
                self.set_state(ConnectionState::Connecting);
                true
            }
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => false,
        }
    }

    /// A connect attempt succeeded.
    ///
    /// Returns an empty list when the machine no longer wanted a transport
    /// (for example after `disconnect`); the caller must then discard it.
    pub fn on_established(&mut self) -> Vec<ChatEvent> {
        let timestamp = now_millis();
        match self.state {
            ConnectionState::Connecting => {
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
                vec![ChatEvent::Connected {
                    user_id: self.user_id,
                    timestamp,
                }]
            }
            ConnectionState::Reconnecting => {
                let attempts = self.attempts;
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
                info!("reconnected after {attempts} failed attempt(s)");
                vec![
                    ChatEvent::Connected {
                        user_id: self.user_id,
                        timestamp,
                    },
                    ChatEvent::Reconnected {
                        attempts,
                        timestamp,
                    },
                ]
            }
            ConnectionState::Connected
            | ConnectionState::Disconnected
            | ConnectionState::Failed => Vec::new(),
        }
    }

    /// A connect attempt failed, or an established transport dropped.
    ///
    /// Errors arriving in `Disconnected` or `Failed` are ignored, which is
    /// what makes `reconnect_failed` fire exactly once per outage.
    pub fn on_transport_error(&mut self, error: &str) -> Vec<ChatEvent> {
        let timestamp = now_millis();
        let mut events = Vec::new();
        match self.state {
            ConnectionState::Connected => {
                events.push(ChatEvent::Disconnected {
                    reason: Some(error.to_string()),
                    timestamp,
                });
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            ConnectionState::Disconnected | ConnectionState::Failed => return events,
        }

        self.attempts = self.attempts.saturating_add(1);
        if self.state != ConnectionState::Connected {
            events.push(ChatEvent::ConnectionError {
                error: error.to_string(),
                attempts: self.attempts,
                timestamp,
            });
        }

        if !self.reconnection {
            self.set_state(ConnectionState::Disconnected);
        } else if self.attempts >= self.max_attempts {
            warn!(
                "giving up after {} failed connection attempt(s)",
                self.attempts
            );
            self.set_state(ConnectionState::Failed);
            events.push(ChatEvent::ReconnectFailed {
                attempts: self.attempts,
                timestamp,
            });
        } else {
            self.set_state(ConnectionState::Reconnecting);
        }
        events
    }

    /// Delay to wait before the next attempt.
    ///
    /// Zero for the initial connect; `base · 2^(attempts-1)` capped at the
    /// configured maximum while reconnecting.
    pub fn backoff_delay(&self) -> Duration {
        if self.state != ConnectionState::Reconnecting || self.attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.attempts - 1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Manual reconnect: restarts from `Disconnected` or `Failed` with the
    /// counter reset. A no-op while connected or already connecting.
    pub fn manual_reconnect(&mut self) -> bool {
        self.start()
    }

    /// Force `Disconnected` and stop automatic reconnection.
    ///
    /// Calling this again is a no-op that emits nothing.
    pub fn disconnect(&mut self, reason: &str) -> Vec<ChatEvent> {
        if self.state == ConnectionState::Disconnected {
            return Vec::new();
        }
        self.attempts = 0;
        self.set_state(ConnectionState::Disconnected);
        vec![ChatEvent::Disconnected {
            reason: Some(reason.to_string()),
            timestamp: now_millis(),
        }]
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

    fn machine(max_attempts: u32) -> ConnectionMachine {
        let config = ConnectionConfig::default().with_max_attempts(max_attempts);
        ConnectionMachine::new(&config, 123)
    }

    fn names(events: &[ChatEvent]) -> Vec<&'static str> {
        events.iter().map(ChatEvent::name).collect()
    }

    #[test]
    fn config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(
            config.transports,
            vec![TransportKind::WebSocket, TransportKind::Polling]
        );
        assert!(config.reconnection);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_millis(1000));
        assert_eq!(config.timeout, Duration::from_millis(20_000));
    }

    #[test]
    fn connect_then_established() {
        let mut m = machine(5);
        assert!(m.start());
        assert_eq!(m.state(), ConnectionState::Connecting);

        let events = m.on_established();
        assert_eq!(names(&events), vec!["connected"]);
        assert!(m.is_connected());
    }

    #[test]
    fn five_failures_reach_failed_once() {
        let mut m = machine(5);
        m.start();

        let mut all = Vec::new();
        for expected in 1..=5 {
            let events = m.on_transport_error("refused");
            if let Some(ChatEvent::ConnectionError { attempts, .. }) = events.first() {
                assert_eq!(*attempts, expected);
            } else {
                panic!("expected connection_error, got {events:?}");
            }
            all.extend(events);
            if expected < 5 {
                assert_eq!(m.state(), ConnectionState::Reconnecting);
            }
        }
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.attempts(), 5);

        // Further failures are ignored: no second reconnect_failed.
        all.extend(m.on_transport_error("refused"));
        all.extend(m.on_transport_error("refused"));
        let failed = all
            .iter()
            .filter(|e| e.name() == "reconnect_failed")
            .count();
        assert_eq!(failed, 1);
        assert_eq!(m.attempts(), 5);
    }

    #[test]
    fn manual_reconnect_resets_attempts() {
        let mut m = machine(2);
        m.start();
        m.on_transport_error("x");
        m.on_transport_error("x");
        assert_eq!(m.state(), ConnectionState::Failed);

        assert!(m.manual_reconnect());
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn reconnect_success_emits_connected_and_reconnected() {
        let mut m = machine(5);
        m.start();
        m.on_established();

        let events = m.on_transport_error("socket closed");
        assert_eq!(names(&events), vec!["disconnected"]);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert_eq!(m.attempts(), 1);

        let events = m.on_established();
        assert_eq!(names(&events), vec!["connected", "reconnected"]);
        if let ChatEvent::Reconnected { attempts, .. } = &events[1] {
            assert_eq!(*attempts, 1);
        }
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn manual_reconnect_while_connecting_is_noop() {
        let mut m = machine(5);
        m.start();
        assert!(!m.manual_reconnect());
        m.on_transport_error("x");
        assert!(!m.manual_reconnect());
        assert_eq!(m.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut m = machine(5);
        m.start();
        m.on_established();

        let first = m.disconnect("client disconnect");
        assert_eq!(names(&first), vec!["disconnected"]);
        let second = m.disconnect("client disconnect");
        assert!(second.is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);

        // A late success after disconnect is discarded.
        assert!(m.on_established().is_empty());
        assert!(m.on_transport_error("late").is_empty());
    }

    #[test]
    fn reconnection_disabled_goes_straight_to_disconnected() {
        let config = ConnectionConfig::default().with_reconnection(false);
        let mut m = ConnectionMachine::new(&config, 1);
        m.start();
        let events = m.on_transport_error("refused");
        assert_eq!(names(&events), vec!["connection_error"]);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.wants_transport());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ConnectionConfig::default()
            .with_max_attempts(10)
            .with_base_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_millis(5000));
        let mut m = ConnectionMachine::new(&config, 1);
        m.start();
        assert_eq!(m.backoff_delay(), Duration::ZERO);

        let mut delays = Vec::new();
        for _ in 0..5 {
            m.on_transport_error("x");
            delays.push(m.backoff_delay().as_millis());
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);
    }
}
