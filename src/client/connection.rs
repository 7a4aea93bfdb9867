//! Client connection lifecycle
//!
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting ...
//! until the attempt budget runs out, after which the manager stays
//! Disconnected until [`ConnectionManager::connect`] is called again.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::config::ClientConfig;
use super::transport::{Transport, TransportEvent};
use crate::ws::protocol::{ClientMsg, ServerMsg, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Delay before reconnect attempt `attempt` (1-indexed):
/// `min(base * 2^(attempt - 1), cap)`
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(cap, |delay| delay.min(cap))
}

pub struct ConnectionManager<T: Transport> {
    transport: T,
    url: String,
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    reconnect_base: Duration,
    reconnect_cap: Duration,
    reconnect_at: Option<Instant>,
    local_id: Option<SessionId>,
    inbox: VecDeque<ServerMsg>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            url: config.server_url.clone(),
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts: config.max_reconnect_attempts,
            reconnect_base: config.reconnect_base,
            reconnect_cap: config.reconnect_cap,
            reconnect_at: None,
            local_id: None,
            inbox: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Reconnect attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Id assigned by the server's `init`, cleared when the transport closes
    pub fn local_id(&self) -> Option<SessionId> {
        self.local_id
    }

    /// When the pending reconnect fires, if one is scheduled
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Explicit connect; also restarts after the manager gave up.
    pub fn connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return;
        }
        info!(url = %self.url, "Connecting");
        self.attempts = 0;
        self.reconnect_at = None;
        self.state = ConnectionState::Connecting;
        self.transport.open(&self.url);
    }

    /// Explicit disconnect; cancels any pending reconnect.
    pub fn disconnect(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        self.reconnect_at = None;
        self.local_id = None;
    }

    /// Drain transport events and fire a due reconnect.
    pub fn poll(&mut self, now: Instant) {
        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::Opened => self.on_open(),
                TransportEvent::Text(text) => self.on_text(&text),
                TransportEvent::Closed(reason) => self.on_close(reason, now),
            }
        }

        if self.state == ConnectionState::Reconnecting
            && self.reconnect_at.is_some_and(|at| now >= at)
        {
            self.reconnect_at = None;
            self.state = ConnectionState::Connecting;
            debug!(attempt = self.attempts, "Reconnect timer fired");
            self.transport.open(&self.url);
        }
    }

    /// Serialize and send now, or drop the message when not connected.
    pub fn send(&mut self, msg: &ClientMsg) -> bool {
        if self.state != ConnectionState::Connected {
            return false;
        }
        let text = match msg.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode client message");
                return false;
            }
        };
        match self.transport.send(text) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Send dropped");
                false
            }
        }
    }

    pub fn next_message(&mut self) -> Option<ServerMsg> {
        self.inbox.pop_front()
    }

    /// Take every queued message in arrival order
    pub fn drain(&mut self) -> impl Iterator<Item = ServerMsg> + '_ {
        self.inbox.drain(..)
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        info!(url = %self.url, "Connected");
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    fn on_text(&mut self, text: &str) {
        let msg = match ServerMsg::decode(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Discarding malformed server message");
                return;
            }
        };

        match msg {
            ServerMsg::Ping => {
                self.send(&ClientMsg::Pong);
            }
            ServerMsg::Pong => {}
            ServerMsg::Init { id, .. } => {
                self.local_id = Some(id);
                self.inbox.push_back(msg);
            }
            other => self.inbox.push_back(other),
        }
    }

    fn on_close(&mut self, reason: Option<String>, now: Instant) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return;
        }
        self.local_id = None;

        let next_attempt = self.attempts + 1;
        if next_attempt > self.max_attempts {
            warn!(attempts = self.attempts, reason = ?reason, "Giving up on reconnecting");
            self.state = ConnectionState::Disconnected;
            self.reconnect_at = None;
            return;
        }

        self.attempts = next_attempt;
        let delay = backoff_delay(next_attempt, self.reconnect_base, self.reconnect_cap);
        warn!(
            attempt = next_attempt,
            delay_ms = delay.as_millis() as u64,
            reason = ?reason,
            "Connection lost, scheduling reconnect"
        );
        self.state = ConnectionState::Reconnecting;
        self.reconnect_at = Some(now + delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::mock::MockTransport;

    fn manager(max_attempts: u32) -> ConnectionManager<MockTransport> {
        let config = ClientConfig {
            max_reconnect_attempts: max_attempts,
            ..ClientConfig::default()
        };
        ConnectionManager::new(MockTransport::default(), &config)
    }

    fn push(manager: &mut ConnectionManager<MockTransport>, event: TransportEvent) {
        manager.transport.events.push_back(event);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(5, base, cap), Duration::from_secs(16));
        assert_eq!(backoff_delay(6, base, cap), cap);
        assert_eq!(backoff_delay(200, base, cap), cap);
    }

    #[test]
    fn connect_then_open() {
        let mut m = manager(3);
        let now = Instant::now();
        m.connect();
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.transport.opens, 1);

        push(&mut m, TransportEvent::Opened);
        m.poll(now);
        assert!(m.is_connected());
    }

    #[test]
    fn sends_dropped_unless_connected() {
        let mut m = manager(3);
        assert!(!m.send(&ClientMsg::Ping));
        m.connect();
        assert!(!m.send(&ClientMsg::Ping));
        push(&mut m, TransportEvent::Opened);
        m.poll(Instant::now());
        assert!(m.send(&ClientMsg::Ping));
        assert_eq!(m.transport.sent.len(), 1);
        assert!(m.transport.sent[0].contains("\"ping\""));
    }

    #[test]
    fn malformed_message_is_discarded() {
        let mut m = manager(3);
        m.connect();
        push(&mut m, TransportEvent::Opened);
        push(&mut m, TransportEvent::Text("{not json".into()));
        push(&mut m, TransportEvent::Text(r#"{"type":"playerLeft","id":4}"#.into()));
        m.poll(Instant::now());

        assert!(m.is_connected());
        assert_eq!(m.next_message(), Some(ServerMsg::PlayerLeft { id: 4 }));
        assert_eq!(m.next_message(), None);
    }

    #[test]
    fn server_ping_is_answered() {
        let mut m = manager(3);
        m.connect();
        push(&mut m, TransportEvent::Opened);
        push(&mut m, TransportEvent::Text(r#"{"type":"ping"}"#.into()));
        m.poll(Instant::now());
        assert_eq!(m.transport.sent, vec![r#"{"type":"pong"}"#.to_string()]);
        assert!(m.next_message().is_none());
    }

    #[test]
    fn close_clears_identity_and_schedules_reconnect() {
        let mut m = manager(3);
        let now = Instant::now();
        m.connect();
        push(&mut m, TransportEvent::Opened);
        let init = ServerMsg::Init {
            id: 7,
            state: crate::ws::protocol::PlayerSnapshot {
                id: 7,
                position: glam::Vec3::ZERO,
                rotation: glam::Quat::IDENTITY,
                animation: Default::default(),
                health: 100.0,
                max_health: 100.0,
            },
            players: Vec::new(),
        };
        push(&mut m, TransportEvent::Text(serde_json::to_string(&init).unwrap()));
        m.poll(now);
        assert_eq!(m.local_id(), Some(7));

        push(&mut m, TransportEvent::Closed(Some("reset".into())));
        m.poll(now);
        assert_eq!(m.local_id(), None);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert_eq!(m.reconnect_at(), Some(now + Duration::from_secs(1)));

        m.poll(now + Duration::from_millis(999));
        assert_eq!(m.transport.opens, 1);
        m.poll(now + Duration::from_secs(1));
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.transport.opens, 2);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut m = manager(2);
        let mut now = Instant::now();
        m.connect();

        // Two failed reconnects are allowed, the third failure is final.
        for attempt in 1..=2 {
            push(&mut m, TransportEvent::Closed(None));
            m.poll(now);
            assert_eq!(m.state(), ConnectionState::Reconnecting);
            assert_eq!(m.attempts(), attempt);
            now += Duration::from_secs(60);
            m.poll(now);
            assert_eq!(m.state(), ConnectionState::Connecting);
        }

        push(&mut m, TransportEvent::Closed(None));
        m.poll(now);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        let opens = m.transport.opens;

        now += Duration::from_secs(3600);
        m.poll(now);
        assert_eq!(m.transport.opens, opens);
        assert_eq!(opens, 3);
    }

    #[test]
    fn successful_open_resets_attempts() {
        let mut m = manager(5);
        let now = Instant::now();
        m.connect();
        push(&mut m, TransportEvent::Closed(None));
        m.poll(now);
        m.poll(now + Duration::from_secs(1));
        push(&mut m, TransportEvent::Opened);
        m.poll(now + Duration::from_secs(1));
        assert!(m.is_connected());
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn explicit_disconnect_cancels_reconnect() {
        let mut m = manager(5);
        let now = Instant::now();
        m.connect();
        push(&mut m, TransportEvent::Closed(None));
        m.poll(now);
        m.disconnect();
        m.poll(now + Duration::from_secs(60));
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.transport.opens, 1);
        assert_eq!(m.transport.closes, 1);
    }
}
